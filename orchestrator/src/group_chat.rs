//! The group chat: participants, channels, broadcast and the turn loop.

use crate::events::Event;
use crate::events::EventEmitter;
use crate::registry::ChannelRegistry;
use crate::registry::TurnChannels;
use crate::state::Audience;
use crate::state::CHAT_STATE_VERSION;
use crate::state::ChannelRecord;
use crate::state::ChatState;
use crate::state::LogEntry;
use crate::strategy::SelectionStrategy;
use crate::strategy::TerminationStrategy;
use agentchat_core::Agent;
use agentchat_core::AgentChatError;
use agentchat_core::ChatConfig;
use agentchat_core::MessageStream;
use agentchat_core::Result;
use agentchat_core::SerializerOptions;
use agentchat_core::agent::validated_channel_keys;
use agentchat_protocol::Message;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// A conversation shared by several agents.
///
/// Cloning is cheap and yields another handle to the same chat, which is how
/// a caller drives turns from more than one task.
///
/// Locks are always taken in the order participants, registry, channels (by
/// key), log.
#[derive(Clone)]
pub struct AgentGroupChat {
    inner: Arc<ChatInner>,
}

struct ChatInner {
    options: SerializerOptions,
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    registry: Mutex<ChannelRegistry>,
    /// Every message in chat order.
    log: Mutex<Vec<LogEntry>>,
    /// Agents with a turn in flight.
    busy: std::sync::Mutex<HashSet<String>>,
    is_complete: AtomicBool,
    /// Cap on turns per `run`, from [`ChatConfig::max_turns`].
    max_turns: Option<usize>,
    events: EventEmitter,
}

/// Builds an [`AgentGroupChat`].
#[derive(Default)]
pub struct GroupChatBuilder {
    options: SerializerOptions,
    max_turns: Option<usize>,
    agents: Vec<Arc<dyn Agent>>,
    events: Option<UnboundedSender<Event>>,
}

impl GroupChatBuilder {
    pub fn serializer(mut self, options: SerializerOptions) -> Self {
        self.options = options;
        self
    }

    /// Takes the serializer options and the `run` turn cap from `config`.
    pub fn config(mut self, config: &ChatConfig) -> Self {
        self.max_turns = Some(config.max_turns);
        self.serializer(config.serializer)
    }

    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Sends every [`Event`] of the chat to `sender`.
    pub fn events(mut self, sender: UnboundedSender<Event>) -> Self {
        self.events = Some(sender);
        self
    }

    pub async fn build(self) -> Result<AgentGroupChat> {
        let chat = AgentGroupChat::with_parts(self.options, self.max_turns, self.events);
        for agent in self.agents {
            chat.add_agent(agent).await?;
        }
        Ok(chat)
    }
}

/// Marks an agent busy for as long as its turn stream is alive.
struct TurnGuard {
    inner: Arc<ChatInner>,
    agent_id: String,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut busy = self
            .inner
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.agent_id);
    }
}

impl ChatInner {
    fn begin_turn(self: &Arc<Self>, agent_id: &str) -> Result<TurnGuard> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(agent_id.to_string()) {
            return Err(AgentChatError::AgentBusy(agent_id.to_string()));
        }
        Ok(TurnGuard {
            inner: self.clone(),
            agent_id: agent_id.to_string(),
        })
    }

    #[cfg(test)]
    fn is_busy(&self, agent_id: &str) -> bool {
        let busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        busy.contains(agent_id)
    }

    fn busy_agents(&self) -> Vec<String> {
        let busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = busy.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Adds `agent` unless a participant with the same id is already present.
    async fn join(&self, agent: &Arc<dyn Agent>) -> Result<()> {
        let keys = validated_channel_keys(agent.as_ref())?;
        let mut agents = self.agents.write().await;
        if let Some(existing) = agents.iter().find(|a| a.id() == agent.id()) {
            if Arc::ptr_eq(existing, agent) {
                return Ok(());
            }
            return Err(AgentChatError::Configuration(format!(
                "another agent with id `{}` already participates",
                agent.id()
            )));
        }
        let mut registry = self.registry.lock().await;
        registry.claim(agent.as_ref(), &keys)?;
        agents.push(agent.clone());
        tracing::info!(chat_id = %self.events.chat_id(), agent_id = %agent.id(), channel_keys = ?keys, "agent joined");
        Ok(())
    }

    /// Appends `message` to every channel in `channels` and to the log as one
    /// step: all channel locks are taken before anything is written, so a
    /// cancelled broadcast writes nothing.
    async fn broadcast(&self, channels: &TurnChannels, agent_id: &str, message: &Message) {
        let mut guards = Vec::with_capacity(channels.targets.len());
        for (_, channel) in &channels.targets {
            guards.push(channel.lock().await);
        }
        let mut log = self.log.lock().await;

        for guard in guards.iter_mut() {
            guard.receive(std::slice::from_ref(message));
        }
        let keys = channels.keys();
        log.push(LogEntry {
            message: message.clone(),
            audience: Audience::Keys(keys.clone()),
        });
        drop(log);
        drop(guards);

        tracing::debug!(chat_id = %self.events.chat_id(), agent_id = %agent_id, message_id = %message.id(), channel_keys = ?keys, "broadcast message");
        self.events
            .message_broadcast(Some(agent_id), message.id(), keys);
    }

    async fn history(&self) -> Vec<Message> {
        let log = self.log.lock().await;
        log.iter().map(|entry| entry.message.clone()).collect()
    }
}

impl AgentGroupChat {
    /// An empty chat using `options` for every serialize and restore call.
    pub fn new(options: SerializerOptions) -> Self {
        Self::with_parts(options, None, None)
    }

    pub fn builder() -> GroupChatBuilder {
        GroupChatBuilder::default()
    }

    fn with_parts(
        options: SerializerOptions,
        max_turns: Option<usize>,
        events: Option<UnboundedSender<Event>>,
    ) -> Self {
        let chat_id = uuid::Uuid::new_v4().to_string();
        Self {
            inner: Arc::new(ChatInner {
                options,
                agents: RwLock::new(Vec::new()),
                registry: Mutex::new(ChannelRegistry::default()),
                log: Mutex::new(Vec::new()),
                busy: std::sync::Mutex::new(HashSet::new()),
                is_complete: AtomicBool::new(false),
                max_turns,
                events: EventEmitter::new(chat_id, events),
            }),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.events.chat_id()
    }

    pub fn serializer_options(&self) -> &SerializerOptions {
        &self.inner.options
    }

    /// Registers a participant. Insertion order is the order
    /// [`crate::SequentialSelection`] follows.
    ///
    /// Fails with [`AgentChatError::Configuration`] when the agent declares no
    /// keys, reuses a participant's id, or binds a key to a different channel
    /// shape than the chat already uses for it.
    pub async fn add_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        self.inner.join(&agent).await
    }

    /// Deregisters a participant. Channels keep their transcripts.
    ///
    /// Fails with [`AgentChatError::AgentBusy`] while the agent has a turn in
    /// flight. A turn started after removal joins the agent again.
    pub async fn remove_agent(&self, agent_id: &str) -> Result<Arc<dyn Agent>> {
        let mut agents = self.inner.agents.write().await;
        let index = agents
            .iter()
            .position(|agent| agent.id() == agent_id)
            .ok_or_else(|| {
                AgentChatError::Configuration(format!("no participant with id `{agent_id}`"))
            })?;
        // Checked and removed under the busy lock so no turn can begin in between.
        let removed = {
            let busy = self
                .inner
                .busy
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if busy.contains(agent_id) {
                return Err(AgentChatError::AgentBusy(agent_id.to_string()));
            }
            agents.remove(index)
        };
        tracing::info!(chat_id = %self.id(), agent_id = %agent_id, "agent left");
        Ok(removed)
    }

    /// Participants in insertion order.
    pub async fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.inner.agents.read().await.clone()
    }

    /// Adds a user message to the chat.
    pub async fn add_user_message(&self, content: impl Into<String>) -> Result<()> {
        self.add_message(Message::user(content)).await
    }

    /// Appends `message` to every live channel keyed by a current participant
    /// and to the chat log. Channels created later are seeded with it.
    pub async fn add_message(&self, message: Message) -> Result<()> {
        let agents = self.inner.agents.read().await;
        let mut participant_keys = BTreeSet::new();
        for agent in agents.iter() {
            participant_keys.extend(validated_channel_keys(agent.as_ref())?);
        }

        let registry = self.inner.registry.lock().await;
        let mut guards = Vec::new();
        for (key, channel) in registry.live() {
            if participant_keys.contains(key) {
                guards.push(channel.lock().await);
            }
        }
        let mut log = self.inner.log.lock().await;

        for guard in guards.iter_mut() {
            guard.receive(std::slice::from_ref(&message));
        }
        tracing::debug!(chat_id = %self.id(), role = %message.role(), channels = guards.len(), "added message");
        let message_id = message.id().to_string();
        log.push(LogEntry {
            message,
            audience: Audience::All,
        });
        drop(log);
        drop(guards);
        drop(registry);

        self.inner.events.message_broadcast(
            None,
            &message_id,
            participant_keys.into_iter().collect(),
        );
        Ok(())
    }

    /// Runs one turn of `agent`, joining it to the chat first when needed.
    ///
    /// The returned stream is lazy: nothing happens until it is polled. Each
    /// message the agent produces is appended to every channel keyed by one of
    /// the agent's keys before it is yielded, so a caller that stops early
    /// never loses output that was already produced. A reasoning failure is
    /// yielded as the last item, after the messages that preceded it.
    pub fn invoke(&self, agent: Arc<dyn Agent>) -> MessageStream<'static> {
        self.turn(agent, None)
    }

    /// Like [`AgentGroupChat::invoke`], but stops waiting on the agent once
    /// `cancel` fires and yields an [`AgentChatError::Invocation`]. Messages
    /// appended before cancellation stay appended; a message is never
    /// partially broadcast.
    pub fn invoke_with_cancellation(
        &self,
        agent: Arc<dyn Agent>,
        cancel: CancellationToken,
    ) -> MessageStream<'static> {
        self.turn(agent, Some(cancel))
    }

    fn turn(
        &self,
        agent: Arc<dyn Agent>,
        cancel: Option<CancellationToken>,
    ) -> MessageStream<'static> {
        let inner = self.inner.clone();
        Box::pin(async_stream::stream! {
            let agent_id = agent.id().to_string();
            let _turn = match inner.begin_turn(&agent_id) {
                Ok(guard) => guard,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            if let Err(err) = inner.join(&agent).await {
                yield Err(err);
                return;
            }

            let resolved = match validated_channel_keys(agent.as_ref()) {
                Ok(keys) => {
                    let mut registry = inner.registry.lock().await;
                    registry
                        .resolve(agent.as_ref(), &keys, &inner.log, &inner.options, &inner.events)
                        .await
                }
                Err(err) => Err(err),
            };
            let channels = match resolved {
                Ok(channels) => channels,
                Err(err) => {
                    tracing::warn!(chat_id = %inner.events.chat_id(), agent_id = %agent_id, "channel resolution failed: {err}");
                    yield Err(err);
                    return;
                }
            };

            let history = channels.primary.lock().await.history();
            let mut produced = 0usize;
            let mut output = agent.invoke(history);
            loop {
                let next = match &cancel {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        item = output.next() => Some(item),
                    },
                    None => Some(output.next().await),
                };

                let item = match next {
                    Some(Some(item)) => item,
                    Some(None) => break,
                    None => Err(AgentChatError::invocation(&agent_id, "turn cancelled")),
                };

                match item {
                    Ok(message) => {
                        inner.broadcast(&channels, &agent_id, &message).await;
                        produced += 1;
                        yield Ok(message);
                    }
                    Err(err) => {
                        let err = match err {
                            err @ AgentChatError::Invocation { .. } => err,
                            other => AgentChatError::invocation(&agent_id, other),
                        };
                        tracing::warn!(chat_id = %inner.events.chat_id(), agent_id = %agent_id, messages = produced, "turn failed: {err}");
                        inner.events.turn_failed(&agent_id, produced, err.to_string());
                        yield Err(err);
                        return;
                    }
                }
            }

            tracing::info!(chat_id = %inner.events.chat_id(), agent_id = %agent_id, messages = produced, "turn completed");
            inner.events.turn_completed(&agent_id, produced);
        })
    }

    /// Looks up a participant by id and runs one turn of it.
    pub async fn invoke_by_id(&self, agent_id: &str) -> Result<MessageStream<'static>> {
        let agents = self.inner.agents.read().await;
        let agent = agents
            .iter()
            .find(|agent| agent.id() == agent_id)
            .cloned()
            .ok_or_else(|| {
                AgentChatError::Configuration(format!("no participant with id `{agent_id}`"))
            })?;
        Ok(self.invoke(agent))
    }

    /// Takes turns picked by `selection` until `termination` fires or its
    /// iteration cap is reached, whichever of that cap and the configured
    /// `max_turns` is lower. Firing sets [`AgentGroupChat::is_complete`];
    /// running a completed chat yields [`AgentChatError::ChatComplete`].
    pub fn run(
        &self,
        selection: Arc<dyn SelectionStrategy>,
        termination: Arc<dyn TerminationStrategy>,
    ) -> MessageStream<'static> {
        let chat = self.clone();
        Box::pin(async_stream::stream! {
            if chat.is_complete() {
                yield Err(AgentChatError::ChatComplete);
                return;
            }

            let limit = match chat.inner.max_turns {
                Some(max_turns) => max_turns.min(termination.maximum_iterations()),
                None => termination.maximum_iterations(),
            };
            for _ in 0..limit {
                let agents = chat.agents().await;
                let history = chat.history().await;
                let agent = match selection.next(&agents, &history).await {
                    Ok(agent) => agent,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                let mut turn = chat.invoke(agent.clone());
                let mut produced = Vec::new();
                while let Some(item) = turn.next().await {
                    match item {
                        Ok(message) => {
                            produced.push(message.clone());
                            yield Ok(message);
                        }
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
                drop(turn);

                if termination.should_terminate(agent.as_ref(), &produced).await {
                    chat.inner.is_complete.store(true, Ordering::SeqCst);
                    tracing::info!(chat_id = %chat.id(), agent_id = %agent.id(), "chat completed");
                    chat.inner.events.chat_completed(agent.id());
                    break;
                }
            }
        })
    }

    /// Whether a termination strategy has ended the chat.
    pub fn is_complete(&self) -> bool {
        self.inner.is_complete.load(Ordering::SeqCst)
    }

    /// Allows [`AgentGroupChat::run`] to continue after termination.
    pub fn reset_complete(&self) {
        self.inner.is_complete.store(false, Ordering::SeqCst);
    }

    /// Every message in chat order.
    pub async fn history(&self) -> Vec<Message> {
        self.inner.history().await
    }

    /// Snapshot of the channel for `key`, if it has been created.
    pub async fn channel_history(&self, key: &str) -> Option<Vec<Message>> {
        let channel = {
            let registry = self.inner.registry.lock().await;
            registry.get(key).cloned()
        }?;
        let channel = channel.lock().await;
        Some(channel.history())
    }

    /// Keys of live and restored-but-unused channels.
    pub async fn channel_keys(&self) -> Vec<String> {
        let registry = self.inner.registry.lock().await;
        registry.keys()
    }

    /// Clears the log and every channel and the completion flag. Fails while
    /// any turn is in flight.
    pub async fn reset(&self) -> Result<()> {
        let _agents = self.inner.agents.write().await;
        let busy = self.inner.busy_agents();
        if let Some(agent_id) = busy.into_iter().next() {
            return Err(AgentChatError::AgentBusy(agent_id));
        }

        let mut registry = self.inner.registry.lock().await;
        for (_, channel) in registry.live() {
            channel.lock().await.reset();
        }
        registry.clear_pending();
        self.inner.log.lock().await.clear();
        self.reset_complete();
        tracing::info!(chat_id = %self.id(), "chat reset");
        Ok(())
    }

    /// Serializes the log and every channel into one versioned blob.
    pub async fn serialize(&self) -> Result<String> {
        let registry = self.inner.registry.lock().await;
        let mut guards = Vec::new();
        for (key, channel) in registry.live() {
            guards.push((key.clone(), channel.lock().await));
        }
        let log = self.inner.log.lock().await;

        let mut channels = Vec::with_capacity(guards.len());
        for (key, guard) in &guards {
            channels.push(ChannelRecord {
                key: key.clone(),
                shape: guard.shape().to_string(),
                state: guard.serialize(&self.inner.options)?,
                history_offset: log.len(),
            });
        }
        channels.extend(registry.pending_records());
        channels.sort_by(|a, b| a.key.cmp(&b.key));

        let state = ChatState {
            version: CHAT_STATE_VERSION,
            is_complete: self.is_complete(),
            history: log.clone(),
            channels,
        };
        state.encode(&self.inner.options)
    }

    /// Loads a blob written by [`AgentGroupChat::serialize`] into this chat,
    /// which must not have any messages or channels yet. Channels are
    /// restored through their agent the first time one of its turns needs
    /// them.
    pub async fn restore(&self, state: &str) -> Result<()> {
        let state = ChatState::decode(state, &self.inner.options)?;

        let _agents = self.inner.agents.read().await;
        let mut registry = self.inner.registry.lock().await;
        let mut log = self.inner.log.lock().await;
        if !registry.is_empty() || !log.is_empty() {
            return Err(AgentChatError::Configuration(
                "restore requires a chat without messages or channels".to_string(),
            ));
        }

        let channel_count = state.channels.len();
        registry.install_pending(state.channels)?;
        *log = state.history;
        self.inner
            .is_complete
            .store(state.is_complete, Ordering::SeqCst);
        tracing::info!(chat_id = %self.id(), messages = log.len(), channels = channel_count, "restored chat");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use assert_matches::assert_matches;
    use core_test_support::counting_agent;
    use core_test_support::texts;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn joining_twice_with_same_handle_is_a_no_op() {
        let chat = AgentGroupChat::new(SerializerOptions::default());
        let agent = counting_agent("a", &["x"]);
        chat.add_agent(agent.clone()).await.unwrap();
        chat.add_agent(agent.clone()).await.unwrap();
        assert_eq!(chat.agents().await.len(), 1);

        let impostor = counting_agent("a", &["x"]);
        assert!(chat.add_agent(impostor).await.is_err());
    }

    #[tokio::test]
    async fn busy_guard_is_released_when_stream_is_dropped() {
        let chat = AgentGroupChat::new(SerializerOptions::default());
        let agent = counting_agent("a", &["x"]);

        let mut turn = chat.invoke(agent.clone());
        turn.next().await.unwrap().unwrap();
        assert!(chat.inner.is_busy("a"));
        drop(turn);
        assert!(!chat.inner.is_busy("a"));

        let replies: Vec<Message> = chat
            .invoke(agent)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(texts(&replies), vec!["a #2"]);
    }

    #[tokio::test]
    async fn removal_waits_for_turns_and_later_turns_rejoin() {
        let chat = AgentGroupChat::new(SerializerOptions::default());
        let agent = counting_agent("a", &["x"]);
        chat.add_agent(agent.clone()).await.unwrap();

        let turn = chat.inner.begin_turn("a").unwrap();
        assert_matches!(
            chat.remove_agent("a").await.err(),
            Some(AgentChatError::AgentBusy(_))
        );
        assert_eq!(chat.agents().await.len(), 1);
        drop(turn);

        chat.remove_agent("a").await.unwrap();
        assert!(chat.agents().await.is_empty());

        let replies: Vec<Message> = chat
            .invoke(agent)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(texts(&replies), vec!["a #1"]);
        assert_eq!(chat.agents().await.len(), 1);
    }

    #[tokio::test]
    async fn serialize_orders_channels_by_key() {
        let chat = AgentGroupChat::new(SerializerOptions::default());
        let agent = counting_agent("a", &["zeta", "alpha"]);
        let _: Vec<_> = chat.invoke(agent).collect().await;

        let state = ChatState::decode(&chat.serialize().await.unwrap(), &SerializerOptions::default())
            .unwrap();
        let keys: Vec<&str> = state.channels.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
        assert!(state.channels.iter().all(|c| c.history_offset == 1));
    }
}
