//! Group chat orchestration over agents and their channels.
//!
//! An [`AgentGroupChat`] owns the participating agents and one live channel per
//! compatibility key. Each turn invokes one agent against its primary
//! channel's history and broadcasts every produced message, as it arrives, to
//! all channels keyed by any of that agent's keys. Which agent speaks next is
//! decided by the caller, or by a [`SelectionStrategy`] handed to
//! [`AgentGroupChat::run`].

pub mod events;
pub mod group_chat;
mod registry;
pub mod state;
pub mod strategy;

pub use events::ChatEvent;
pub use events::Event;
pub use group_chat::AgentGroupChat;
pub use group_chat::GroupChatBuilder;
pub use state::Audience;
pub use strategy::FnSelection;
pub use strategy::KeywordTermination;
pub use strategy::MaxTurnsTermination;
pub use strategy::SelectionStrategy;
pub use strategy::SequentialSelection;
pub use strategy::TerminationStrategy;
