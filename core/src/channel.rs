//! Channels hold the canonical transcript for one compatibility key.

use crate::error::AgentChatError;
use crate::error::Result;
use crate::serializer::SerializerOptions;
use agentchat_protocol::Message;
use serde::Deserialize;
use serde::Serialize;

/// Stateful holder of the message sequence shared by every agent that
/// declares the same channel key.
///
/// Appends are in-memory and never block. Messages are only ever added at
/// the end; [`Channel::reset`] is the single operation that removes them.
pub trait Channel: Send + Sync {
    /// The compatibility key this channel was created for.
    fn key(&self) -> &str;

    /// Identifies the concrete transcript shape. Two agents may only share a
    /// key when they agree on its shape.
    fn shape(&self) -> &'static str;

    /// Appends `messages` in the order given.
    fn receive(&mut self, messages: &[Message]);

    /// Oldest-first snapshot of the transcript.
    fn history(&self) -> Vec<Message>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captures enough state for the owning agent's `restore_channel` to
    /// rebuild an equivalent transcript.
    fn serialize(&self, options: &SerializerOptions) -> Result<String>;

    /// Drops every message.
    fn reset(&mut self);
}

/// Shape name of [`ChatHistoryChannel`].
pub const CHAT_HISTORY_SHAPE: &str = "chat_history";

const CHAT_HISTORY_STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChatHistoryState {
    version: u32,
    shape: String,
    messages: Vec<Message>,
}

/// A channel whose state is the plain ordered list of messages.
#[derive(Debug, Clone, Default)]
pub struct ChatHistoryChannel {
    key: String,
    messages: Vec<Message>,
}

impl ChatHistoryChannel {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_history(key: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            key: key.into(),
            messages,
        }
    }

    /// Rebuilds a channel from a blob written by [`Channel::serialize`].
    pub fn restore(
        key: impl Into<String>,
        state: &str,
        options: &SerializerOptions,
    ) -> Result<Self> {
        let state: ChatHistoryState = options.decode_versioned(
            state,
            CHAT_HISTORY_STATE_VERSION,
            "chat history channel state",
        )?;
        if state.shape != CHAT_HISTORY_SHAPE {
            return Err(AgentChatError::Deserialization(format!(
                "expected channel shape `{CHAT_HISTORY_SHAPE}`, found `{}`",
                state.shape
            )));
        }
        Ok(Self::with_history(key, state.messages))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

impl Channel for ChatHistoryChannel {
    fn key(&self) -> &str {
        &self.key
    }

    fn shape(&self) -> &'static str {
        CHAT_HISTORY_SHAPE
    }

    fn receive(&mut self, messages: &[Message]) {
        self.messages.extend_from_slice(messages);
    }

    fn history(&self) -> Vec<Message> {
        self.messages.clone()
    }

    fn len(&self) -> usize {
        self.messages.len()
    }

    fn serialize(&self, options: &SerializerOptions) -> Result<String> {
        options.encode(&ChatHistoryState {
            version: CHAT_HISTORY_STATE_VERSION,
            shape: CHAT_HISTORY_SHAPE.to_string(),
            messages: self.messages.clone(),
        })
    }

    fn reset(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use agentchat_protocol::Annotation;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn contents(channel: &dyn Channel) -> Vec<String> {
        channel.history().iter().map(Message::text).collect()
    }

    #[test]
    fn receive_preserves_arrival_order_across_calls() {
        let mut channel = ChatHistoryChannel::new("chat");
        assert!(channel.is_empty());

        channel.receive(&[Message::user("1"), Message::agent("2")]);
        channel.receive(&[]);
        channel.receive(&[Message::agent("3")]);
        channel.receive(&[Message::user("4"), Message::tool("5"), Message::agent("6")]);

        assert_eq!(contents(&channel), vec!["1", "2", "3", "4", "5", "6"]);
        assert_eq!(channel.len(), 6);
    }

    #[test]
    fn serialize_then_restore_yields_equal_history() {
        let mut channel = ChatHistoryChannel::new("chat");
        channel.receive(&[
            Message::user("Which segment had the most sales?"),
            Message::agent("Enterprise")
                .with_author("analyst")
                .with_annotation(Annotation::new("sales.csv", "file-1")),
            Message::user("Thanks"),
        ]);

        let options = SerializerOptions::default();
        let state = channel.serialize(&options).unwrap();
        let restored = ChatHistoryChannel::restore("chat", &state, &options).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.history(), channel.history());
        assert_eq!(restored.key(), "chat");
    }

    #[test]
    fn empty_channel_round_trips() {
        let options = SerializerOptions::default();
        let state = ChatHistoryChannel::new("chat").serialize(&options).unwrap();
        let restored = ChatHistoryChannel::restore("chat", &state, &options).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn restore_rejects_foreign_shape() {
        let state = r#"{"version":1,"shape":"assistant_thread","messages":[]}"#;
        let err =
            ChatHistoryChannel::restore("chat", state, &SerializerOptions::default()).unwrap_err();
        assert_matches!(err, AgentChatError::Deserialization(msg) if msg.contains("assistant_thread"));
    }

    #[test]
    fn restore_rejects_unknown_fields() {
        let state = r#"{"version":1,"shape":"chat_history","messages":[],"cursor":3}"#;
        assert_matches!(
            ChatHistoryChannel::restore("chat", state, &SerializerOptions::default()),
            Err(AgentChatError::Deserialization(_))
        );
    }

    #[test]
    fn reset_is_the_only_way_to_drop_messages() {
        let mut channel = ChatHistoryChannel::new("chat");
        channel.receive(&[Message::user("hi")]);
        channel.reset();
        assert!(channel.is_empty());
        channel.receive(&[Message::user("again")]);
        assert_eq!(contents(&channel), vec!["again"]);
    }
}
