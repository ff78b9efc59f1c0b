#![allow(clippy::unwrap_used)]

//! Scripted agents and reasoning services for integration tests.

use agentchat_core::Agent;
use agentchat_core::AgentChatError;
use agentchat_core::Channel;
use agentchat_core::ChatHistoryAgent;
use agentchat_core::MessageStream;
use agentchat_core::SerializerOptions;
use agentchat_core::protocol::AgentIdentity;
use agentchat_core::protocol::Message;
use agentchat_core::reasoning::ReasoningRequest;
use agentchat_core::reasoning::ReasoningService;
use agentchat_core::reasoning::ReasoningStream;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tokio::sync::Notify;

/// One step of a scripted turn.
#[derive(Clone)]
pub enum Step {
    Reply(Message),
    Fail(String),
    /// Waits until the notify fires, then continues with the next step.
    WaitFor(Arc<Notify>),
    /// Never resolves.
    Hang,
}

pub fn reply(text: &str) -> Step {
    Step::Reply(Message::agent(text))
}

/// Plays back one scripted turn per `respond` call. Once the script runs out
/// every further turn is empty.
#[derive(Clone, Default)]
pub struct ScriptedService {
    turns: Arc<Mutex<VecDeque<Vec<Step>>>>,
    requests: Arc<Mutex<Vec<ReasoningRequest>>>,
}

impl ScriptedService {
    pub fn new(turns: Vec<Vec<Step>>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns.into())),
            requests: Arc::default(),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ReasoningService for ScriptedService {
    fn respond(&self, request: ReasoningRequest) -> ReasoningStream {
        self.requests.lock().unwrap().push(request);
        let steps = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async_stream::stream! {
            for step in steps {
                match step {
                    Step::Reply(message) => {
                        yield Ok(message);
                    }
                    Step::Fail(reason) => {
                        yield Err(anyhow::anyhow!(reason));
                        return;
                    }
                    Step::WaitFor(notify) => notify.notified().await,
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        })
    }
}

/// Replies `"<name> #<n>"` on every turn, forever.
#[derive(Clone)]
pub struct CountingService {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl CountingService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::default(),
        }
    }
}

impl ReasoningService for CountingService {
    fn respond(&self, _request: ReasoningRequest) -> ReasoningStream {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let text = format!("{} #{n}", self.name);
        Box::pin(futures::stream::iter([Ok(Message::agent(text))]))
    }
}

pub fn scripted_agent(id: &str, keys: &[&str], turns: Vec<Vec<Step>>) -> Arc<dyn Agent> {
    Arc::new(
        ChatHistoryAgent::new(AgentIdentity::new(id), ScriptedService::new(turns))
            .with_channel_keys(keys.iter().copied()),
    )
}

pub fn counting_agent(id: &str, keys: &[&str]) -> Arc<dyn Agent> {
    Arc::new(
        ChatHistoryAgent::new(AgentIdentity::new(id), CountingService::new(id))
            .with_channel_keys(keys.iter().copied()),
    )
}

/// Text of each message, in order.
pub fn texts(messages: &[Message]) -> Vec<String> {
    messages.iter().map(Message::text).collect()
}

/// Agent whose channel factory fails for one key.
pub struct BrokenFactoryAgent {
    identity: AgentIdentity,
    keys: Vec<String>,
    broken_key: String,
}

impl BrokenFactoryAgent {
    pub fn new(id: &str, keys: &[&str], broken_key: &str) -> Self {
        Self {
            identity: AgentIdentity::new(id),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            broken_key: broken_key.to_string(),
        }
    }
}

#[async_trait]
impl Agent for BrokenFactoryAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    fn channel_keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn channel_shape(&self) -> &'static str {
        agentchat_core::channel::CHAT_HISTORY_SHAPE
    }

    async fn create_channel(&self, key: &str) -> agentchat_core::Result<Box<dyn Channel>> {
        if key == self.broken_key {
            return Err(AgentChatError::channel_creation(key, "backing store offline"));
        }
        Ok(Box::new(agentchat_core::ChatHistoryChannel::new(key)))
    }

    async fn restore_channel(
        &self,
        key: &str,
        state: &str,
        options: &SerializerOptions,
    ) -> agentchat_core::Result<Box<dyn Channel>> {
        let channel = agentchat_core::ChatHistoryChannel::restore(key, state, options)?;
        Ok(Box::new(channel))
    }

    fn invoke(&self, _history: Vec<Message>) -> MessageStream<'_> {
        Box::pin(futures::stream::iter([Ok(Message::agent("unreachable"))]))
    }
}

/// Agent claiming a channel shape nobody else uses.
pub struct ForeignShapeAgent {
    identity: AgentIdentity,
    keys: Vec<String>,
}

impl ForeignShapeAgent {
    pub fn new(id: &str, keys: &[&str]) -> Self {
        Self {
            identity: AgentIdentity::new(id),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

#[async_trait]
impl Agent for ForeignShapeAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    fn channel_keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn channel_shape(&self) -> &'static str {
        "assistant_thread"
    }

    async fn create_channel(&self, key: &str) -> agentchat_core::Result<Box<dyn Channel>> {
        Err(AgentChatError::channel_creation(
            key,
            "assistant threads are not available in tests",
        ))
    }

    async fn restore_channel(
        &self,
        key: &str,
        _state: &str,
        _options: &SerializerOptions,
    ) -> agentchat_core::Result<Box<dyn Channel>> {
        Err(AgentChatError::channel_creation(
            key,
            "assistant threads are not available in tests",
        ))
    }

    fn invoke(&self, _history: Vec<Message>) -> MessageStream<'_> {
        Box::pin(futures::stream::empty())
    }
}
