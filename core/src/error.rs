use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentChatError>;

/// Errors surfaced by channels, agents and the group chat.
///
/// Channel resolution errors abort only the call that hit them. Nothing in
/// this crate retries; messages that were already appended stay appended.
#[derive(Debug, Error)]
pub enum AgentChatError {
    /// Invalid agent or chat setup: no channel keys, a key claimed with two
    /// different channel shapes, an unknown participant, a bad config file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persisted state that is malformed, too large, or of an unknown schema.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to create channel `{key}`: {reason}")]
    ChannelCreation { key: String, reason: String },

    /// The external reasoning step failed or the turn was cancelled.
    #[error("agent `{agent_id}` invocation failed: {reason}")]
    Invocation { agent_id: String, reason: String },

    /// The agent already has a turn in flight.
    #[error("agent `{0}` is busy with another turn")]
    AgentBusy(String),

    #[error("chat has completed; reset the completion flag to continue")]
    ChatComplete,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentChatError {
    pub fn invocation(agent_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Invocation {
            agent_id: agent_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn channel_creation(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ChannelCreation {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

