//! Agent and channel contracts for multi-agent chats.
//!
//! An [`Agent`] declares the channel keys it can participate in and knows how
//! to create or restore a [`Channel`] for each of them. A channel owns the
//! canonical transcript for every agent that shares its key. Driving turns
//! across several agents lives in the `agentchat-orchestrator` crate.

pub mod agent;
pub mod channel;
mod chat_history_agent;
pub mod config;
pub mod content;
pub mod error;
pub mod reasoning;
pub mod serializer;

pub use agent::Agent;
pub use agent::MessageStream;
pub use channel::Channel;
pub use channel::ChatHistoryChannel;
pub use chat_history_agent::CHAT_HISTORY_KEY;
pub use chat_history_agent::ChatHistoryAgent;
pub use config::ChatConfig;
pub use error::AgentChatError;
pub use error::Result;
pub use serializer::SerializerOptions;

pub use agentchat_protocol as protocol;
