//! Data types shared by every participant of an agent group chat.
//!
//! Nothing in this crate is async or stateful: these are the values that flow
//! through channels and land in persisted state.

pub mod message;

pub use message::AgentIdentity;
pub use message::Annotation;
pub use message::AuthorRole;
pub use message::ContentItem;
pub use message::Message;
