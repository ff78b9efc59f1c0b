//! Persisted form of a whole group chat.

use agentchat_core::AgentChatError;
use agentchat_core::Result;
use agentchat_core::SerializerOptions;
use agentchat_protocol::Message;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;

pub const CHAT_STATE_VERSION: u32 = 1;

/// Which channels a logged message was delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Audience {
    /// Every channel, including ones created later.
    All,
    /// Only channels with one of these keys.
    Keys(Vec<String>),
}

impl Audience {
    pub fn covers(&self, key: &str) -> bool {
        match self {
            Audience::All => true,
            Audience::Keys(keys) => keys.iter().any(|k| k == key),
        }
    }
}

/// One message in chat order, with the channels it went to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogEntry {
    pub message: Message,
    pub audience: Audience,
}

/// Messages logged at index `from` or later whose audience covers `key`.
pub fn backlog<'a>(
    log: &'a [LogEntry],
    key: &'a str,
    from: usize,
) -> impl Iterator<Item = &'a Message> + 'a {
    log.iter()
        .skip(from)
        .filter(move |entry| entry.audience.covers(key))
        .map(|entry| &entry.message)
}

/// A channel's opaque blob as produced by [`agentchat_core::Channel::serialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelRecord {
    pub key: String,
    pub shape: String,
    pub state: String,
    /// Number of chat log entries already reflected in `state`. Entries from
    /// this index on are replayed into the channel when it is restored.
    pub history_offset: usize,
}

/// Snapshot written by `AgentGroupChat::serialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatState {
    pub version: u32,
    pub is_complete: bool,
    pub history: Vec<LogEntry>,
    pub channels: Vec<ChannelRecord>,
}

impl ChatState {
    pub fn encode(&self, options: &SerializerOptions) -> Result<String> {
        options.encode(self)
    }

    /// Parses and validates a chat snapshot.
    pub fn decode(state: &str, options: &SerializerOptions) -> Result<Self> {
        let chat: ChatState = options.decode_versioned(state, CHAT_STATE_VERSION, "chat state")?;

        let mut keys = HashSet::new();
        for record in &chat.channels {
            if record.key.trim().is_empty() {
                return Err(AgentChatError::Deserialization(
                    "chat state has a channel with a blank key".to_string(),
                ));
            }
            if !keys.insert(record.key.as_str()) {
                return Err(AgentChatError::Deserialization(format!(
                    "chat state lists channel `{}` twice",
                    record.key
                )));
            }
            if record.history_offset > chat.history.len() {
                return Err(AgentChatError::Deserialization(format!(
                    "channel `{}` claims offset {} past the end of a {}-entry history",
                    record.key,
                    record.history_offset,
                    chat.history.len()
                )));
            }
        }
        Ok(chat)
    }

    /// Messages in chat order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.history.iter().map(|entry| &entry.message)
    }

    pub fn channel(&self, key: &str) -> Option<&ChannelRecord> {
        self.channels.iter().find(|record| record.key == key)
    }

    /// Log entries a restored `record` has not seen yet; they are appended to
    /// the channel when it is restored into a chat.
    pub fn backlog<'a>(
        &'a self,
        record: &'a ChannelRecord,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        backlog(&self.history, &record.key, record.history_offset)
    }
}
