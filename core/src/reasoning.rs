//! Boundary to the external service that produces an agent's replies.

use agentchat_protocol::Message;
use futures::Stream;
use std::pin::Pin;

/// Lazily produced replies from one reasoning request.
pub type ReasoningStream = Pin<Box<dyn Stream<Item = anyhow::Result<Message>> + Send>>;

/// One request to a reasoning service.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    /// Agent instructions, when the agent has any.
    pub instructions: Option<String>,
    /// The channel transcript, oldest first.
    pub history: Vec<Message>,
}

/// The external collaborator an agent delegates its turn to (a language model,
/// a hosted assistant, a rules engine).
///
/// Implementations return a finite stream. Yielding an `Err` ends the turn;
/// whatever was yielded before it has already been delivered.
pub trait ReasoningService: Send + Sync {
    fn respond(&self, request: ReasoningRequest) -> ReasoningStream;
}
