//! Maps compatibility keys to live channels.

use crate::events::EventEmitter;
use crate::state;
use crate::state::ChannelRecord;
use crate::state::LogEntry;
use agentchat_core::Agent;
use agentchat_core::AgentChatError;
use agentchat_core::Channel;
use agentchat_core::Result;
use agentchat_core::SerializerOptions;
use agentchat_protocol::Message;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A channel shared by every agent holding its key. The mutex serializes
/// appends from concurrent turns.
pub(crate) type SharedChannel = Arc<Mutex<Box<dyn Channel>>>;

/// Channel blob waiting for the first agent that needs its key.
struct PendingChannel {
    shape: String,
    state: String,
    history_offset: usize,
}

/// The channels one turn reads from and broadcasts to, sorted by key.
pub(crate) struct TurnChannels {
    pub(crate) primary: SharedChannel,
    pub(crate) targets: Vec<(String, SharedChannel)>,
}

impl TurnChannels {
    pub(crate) fn keys(&self) -> Vec<String> {
        self.targets.iter().map(|(key, _)| key.clone()).collect()
    }
}

#[derive(Default)]
pub(crate) struct ChannelRegistry {
    /// Shape each key is bound to. Fixed for the life of the chat.
    shapes: HashMap<String, String>,
    channels: BTreeMap<String, SharedChannel>,
    pending: HashMap<String, PendingChannel>,
}

impl ChannelRegistry {
    /// Fails when one of `keys` is already bound to a different shape.
    pub(crate) fn check_claim(&self, agent: &dyn Agent, keys: &[String]) -> Result<()> {
        let shape = agent.channel_shape();
        for key in keys {
            if let Some(existing) = self.shapes.get(key)
                && existing != shape
            {
                return Err(AgentChatError::Configuration(format!(
                    "agent `{}` wants channel `{key}` as `{shape}`, but it is already `{existing}`",
                    agent.id()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn claim(&mut self, agent: &dyn Agent, keys: &[String]) -> Result<()> {
        self.check_claim(agent, keys)?;
        for key in keys {
            self.shapes
                .entry(key.clone())
                .or_insert_with(|| agent.channel_shape().to_string());
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.pending.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&SharedChannel> {
        self.channels.get(key)
    }

    /// Live channels in key order.
    pub(crate) fn live(&self) -> impl Iterator<Item = (&String, &SharedChannel)> {
        self.channels.iter()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .channels
            .keys()
            .chain(self.pending.keys())
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Returns the channels for `keys`, creating or restoring the missing
    /// ones. Either every missing channel is installed or none is.
    pub(crate) async fn resolve(
        &mut self,
        agent: &dyn Agent,
        keys: &[String],
        log: &Mutex<Vec<LogEntry>>,
        options: &SerializerOptions,
        events: &EventEmitter,
    ) -> Result<TurnChannels> {
        let mut fresh: Vec<(String, Box<dyn Channel>, bool)> = Vec::new();
        for key in keys {
            if self.channels.contains_key(key) {
                continue;
            }
            let (channel, restored) = self.materialize(agent, key, log, options).await?;
            fresh.push((key.clone(), channel, restored));
        }

        for (key, channel, restored) in fresh {
            if restored {
                self.pending.remove(&key);
                tracing::info!(chat_id = %events.chat_id(), agent_id = %agent.id(), channel_key = %key, messages = channel.len(), "restored channel");
                events.channel_restored(&key, agent.id());
            } else {
                tracing::info!(chat_id = %events.chat_id(), agent_id = %agent.id(), channel_key = %key, messages = channel.len(), "created channel");
                events.channel_created(&key, agent.id());
            }
            self.channels.insert(key, Arc::new(Mutex::new(channel)));
        }

        let mut targets = Vec::with_capacity(keys.len());
        for key in keys {
            let channel = self.channels.get(key).ok_or_else(|| {
                AgentChatError::channel_creation(key.as_str(), "channel vanished during resolution")
            })?;
            targets.push((key.clone(), channel.clone()));
        }
        let primary = targets
            .first()
            .map(|(_, channel)| channel.clone())
            .ok_or_else(|| {
                AgentChatError::Configuration(format!(
                    "agent `{}` declares no channel keys",
                    agent.id()
                ))
            })?;
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(TurnChannels { primary, targets })
    }

    async fn materialize(
        &self,
        agent: &dyn Agent,
        key: &str,
        log: &Mutex<Vec<LogEntry>>,
        options: &SerializerOptions,
    ) -> Result<(Box<dyn Channel>, bool)> {
        let (mut channel, replay_from, restored) = match self.pending.get(key) {
            Some(pending) => {
                let channel = agent
                    .restore_channel(key, &pending.state, options)
                    .await?;
                if channel.shape() != pending.shape {
                    return Err(AgentChatError::channel_creation(
                        key,
                        format!(
                            "restored channel has shape `{}`, persisted state is `{}`",
                            channel.shape(),
                            pending.shape
                        ),
                    ));
                }
                (channel, pending.history_offset, true)
            }
            None => (agent.create_channel(key).await?, 0, false),
        };

        if channel.shape() != agent.channel_shape() {
            return Err(AgentChatError::channel_creation(
                key,
                format!(
                    "agent `{}` produced a `{}` channel but declares `{}`",
                    agent.id(),
                    channel.shape(),
                    agent.channel_shape()
                ),
            ));
        }

        let log = log.lock().await;
        let backlog: Vec<Message> = state::backlog(&log, key, replay_from).cloned().collect();
        channel.receive(&backlog);

        Ok((channel, restored))
    }

    /// Parks persisted channels until an agent asks for their key.
    pub(crate) fn install_pending(&mut self, records: Vec<ChannelRecord>) -> Result<()> {
        for record in &records {
            if let Some(existing) = self.shapes.get(&record.key)
                && *existing != record.shape
            {
                return Err(AgentChatError::Configuration(format!(
                    "persisted channel `{}` is `{}`, but participants use `{existing}`",
                    record.key, record.shape
                )));
            }
        }
        for record in records {
            self.shapes
                .entry(record.key.clone())
                .or_insert_with(|| record.shape.clone());
            self.pending.insert(
                record.key,
                PendingChannel {
                    shape: record.shape,
                    state: record.state,
                    history_offset: record.history_offset,
                },
            );
        }
        Ok(())
    }

    /// Records for channels that were restored into this chat but never used.
    pub(crate) fn pending_records(&self) -> Vec<ChannelRecord> {
        self.pending
            .iter()
            .map(|(key, pending)| ChannelRecord {
                key: key.clone(),
                shape: pending.shape.clone(),
                state: pending.state.clone(),
                history_offset: pending.history_offset,
            })
            .collect()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
