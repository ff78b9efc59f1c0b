//! Turn selection and termination policies for [`crate::AgentGroupChat::run`].
//!
//! The chat never picks a speaker on its own; these are only consulted when a
//! caller hands them to the turn loop.

use agentchat_core::Agent;
use agentchat_core::AgentChatError;
use agentchat_core::Result;
use agentchat_protocol::Message;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Picks the agent that takes the next turn.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    /// `agents` is the participant list in insertion order, `history` the
    /// chat-level transcript.
    async fn next(
        &self,
        agents: &[Arc<dyn Agent>],
        history: &[Message],
    ) -> Result<Arc<dyn Agent>>;
}

/// Round-robin over participants in insertion order.
#[derive(Debug, Default)]
pub struct SequentialSelection {
    index: AtomicUsize,
}

impl SequentialSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts again from the first participant.
    pub fn reset(&self) {
        self.index.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl SelectionStrategy for SequentialSelection {
    async fn next(
        &self,
        agents: &[Arc<dyn Agent>],
        _history: &[Message],
    ) -> Result<Arc<dyn Agent>> {
        if agents.is_empty() {
            return Err(AgentChatError::Configuration(
                "no agents to select from".to_string(),
            ));
        }
        let turn = self.index.fetch_add(1, Ordering::SeqCst);
        Ok(agents[turn % agents.len()].clone())
    }
}

/// Selection delegated to a closure.
pub struct FnSelection<F> {
    select: F,
}

impl<F> FnSelection<F>
where
    F: Fn(&[Arc<dyn Agent>], &[Message]) -> Option<Arc<dyn Agent>> + Send + Sync,
{
    pub fn new(select: F) -> Self {
        Self { select }
    }
}

#[async_trait]
impl<F> SelectionStrategy for FnSelection<F>
where
    F: Fn(&[Arc<dyn Agent>], &[Message]) -> Option<Arc<dyn Agent>> + Send + Sync,
{
    async fn next(
        &self,
        agents: &[Arc<dyn Agent>],
        history: &[Message],
    ) -> Result<Arc<dyn Agent>> {
        (self.select)(agents, history).ok_or_else(|| {
            AgentChatError::Configuration("selection strategy chose no agent".to_string())
        })
    }
}

/// Decides whether the chat is done after a turn.
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    /// Called after `agent`'s turn with the messages that turn produced, in
    /// order. Empty when the agent said nothing.
    async fn should_terminate(&self, agent: &dyn Agent, turn: &[Message]) -> bool;

    /// Upper bound on turns in one run of the loop.
    fn maximum_iterations(&self) -> usize;
}

/// Never fires; only caps the number of turns.
#[derive(Debug, Clone, Copy)]
pub struct MaxTurnsTermination {
    maximum_iterations: usize,
}

impl MaxTurnsTermination {
    pub fn new(maximum_iterations: usize) -> Self {
        Self { maximum_iterations }
    }
}

#[async_trait]
impl TerminationStrategy for MaxTurnsTermination {
    async fn should_terminate(&self, _agent: &dyn Agent, _turn: &[Message]) -> bool {
        false
    }

    fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }
}

/// Fires when the last message of a turn contains `keyword`.
///
/// With a non-empty agent filter, only turns taken by those agents are
/// checked. A turn without output never fires.
#[derive(Debug, Clone)]
pub struct KeywordTermination {
    keyword: String,
    agent_ids: HashSet<String>,
    maximum_iterations: usize,
}

impl KeywordTermination {
    pub fn new(keyword: impl Into<String>, maximum_iterations: usize) -> Self {
        Self {
            keyword: keyword.into(),
            agent_ids: HashSet::new(),
            maximum_iterations,
        }
    }

    pub fn for_agents<I, S>(mut self, agent_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agent_ids = agent_ids.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TerminationStrategy for KeywordTermination {
    async fn should_terminate(&self, agent: &dyn Agent, turn: &[Message]) -> bool {
        if !self.agent_ids.is_empty() && !self.agent_ids.contains(agent.id()) {
            return false;
        }
        turn.last()
            .is_some_and(|message| message.text().contains(&self.keyword))
    }

    fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }
}
