//! The polymorphic agent contract.

use crate::channel::Channel;
use crate::error::AgentChatError;
use crate::error::Result;
use crate::serializer::SerializerOptions;
use agentchat_protocol::AgentIdentity;
use agentchat_protocol::Message;
use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeSet;
use std::pin::Pin;

/// One turn's output: finite, lazily produced and consumed once.
pub type MessageStream<'a> = Pin<Box<dyn Stream<Item = Result<Message>> + Send + 'a>>;

/// A chat participant.
///
/// The chat only ever talks to agents through this trait; concrete agent
/// kinds differ in the channel shapes they create and in how they produce a
/// turn.
#[async_trait]
pub trait Agent: Send + Sync {
    fn identity(&self) -> &AgentIdentity;

    /// Compatibility keys this agent participates in. The first key is the
    /// agent's primary channel: its history is what the agent reads on
    /// [`Agent::invoke`]. Must not change over the agent's lifetime.
    fn channel_keys(&self) -> Vec<String>;

    /// Shape of the channels this agent creates. Agents sharing a key must
    /// agree on it.
    fn channel_shape(&self) -> &'static str;

    /// Creates a fresh, empty channel for `key`.
    async fn create_channel(&self, key: &str) -> Result<Box<dyn Channel>>;

    /// Rebuilds the channel for `key` from a blob written by
    /// [`Channel::serialize`].
    async fn restore_channel(
        &self,
        key: &str,
        state: &str,
        options: &SerializerOptions,
    ) -> Result<Box<dyn Channel>>;

    /// Produces this turn's messages from the primary channel's history.
    fn invoke(&self, history: Vec<Message>) -> MessageStream<'_>;

    fn id(&self) -> &str {
        &self.identity().id
    }
}

/// Validates an agent's declared keys and returns them deduplicated in
/// declaration order.
pub fn validated_channel_keys(agent: &dyn Agent) -> Result<Vec<String>> {
    let declared = agent.channel_keys();
    if declared.is_empty() {
        return Err(AgentChatError::Configuration(format!(
            "agent `{}` declares no channel keys",
            agent.id()
        )));
    }

    let mut seen = BTreeSet::new();
    let mut keys = Vec::with_capacity(declared.len());
    for key in declared {
        if key.trim().is_empty() {
            return Err(AgentChatError::Configuration(format!(
                "agent `{}` declares a blank channel key",
                agent.id()
            )));
        }
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    Ok(keys)
}
