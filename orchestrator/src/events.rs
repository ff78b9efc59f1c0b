//! Chat lifecycle events and their fan-out to an optional observer.

use tokio::sync::mpsc::UnboundedSender;

/// Something that happened inside a group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ChannelCreated {
        key: String,
        agent_id: String,
    },
    ChannelRestored {
        key: String,
        agent_id: String,
    },
    /// A message was appended to every channel in `keys`.
    MessageBroadcast {
        agent_id: Option<String>,
        message_id: String,
        keys: Vec<String>,
    },
    TurnCompleted {
        agent_id: String,
        messages: usize,
    },
    TurnFailed {
        agent_id: String,
        messages: usize,
        reason: String,
    },
    /// A termination strategy ended the chat after `agent_id`'s turn.
    ChatCompleted {
        agent_id: String,
    },
}

/// A [`ChatEvent`] stamped with the chat it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub chat_id: String,
    pub msg: ChatEvent,
}

/// Helper to emit chat events. Without a sender, events are dropped.
#[derive(Clone)]
pub(crate) struct EventEmitter {
    chat_id: String,
    sender: Option<UnboundedSender<Event>>,
}

impl EventEmitter {
    pub(crate) fn new(chat_id: String, sender: Option<UnboundedSender<Event>>) -> Self {
        Self { chat_id, sender }
    }

    pub(crate) fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub(crate) fn emit(&self, msg: ChatEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event = Event {
            chat_id: self.chat_id.clone(),
            msg,
        };
        if sender.send(event).is_err() {
            tracing::trace!(chat_id = %self.chat_id, "event receiver dropped");
        }
    }

    pub(crate) fn channel_created(&self, key: &str, agent_id: &str) {
        self.emit(ChatEvent::ChannelCreated {
            key: key.to_string(),
            agent_id: agent_id.to_string(),
        });
    }

    pub(crate) fn channel_restored(&self, key: &str, agent_id: &str) {
        self.emit(ChatEvent::ChannelRestored {
            key: key.to_string(),
            agent_id: agent_id.to_string(),
        });
    }

    pub(crate) fn message_broadcast(
        &self,
        agent_id: Option<&str>,
        message_id: &str,
        keys: Vec<String>,
    ) {
        self.emit(ChatEvent::MessageBroadcast {
            agent_id: agent_id.map(str::to_string),
            message_id: message_id.to_string(),
            keys,
        });
    }

    pub(crate) fn turn_completed(&self, agent_id: &str, messages: usize) {
        self.emit(ChatEvent::TurnCompleted {
            agent_id: agent_id.to_string(),
            messages,
        });
    }

    pub(crate) fn turn_failed(&self, agent_id: &str, messages: usize, reason: String) {
        self.emit(ChatEvent::TurnFailed {
            agent_id: agent_id.to_string(),
            messages,
            reason,
        });
    }

    pub(crate) fn chat_completed(&self, agent_id: &str) {
        self.emit(ChatEvent::ChatCompleted {
            agent_id: agent_id.to_string(),
        });
    }
}
