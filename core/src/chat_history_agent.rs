use crate::agent::Agent;
use crate::agent::MessageStream;
use crate::channel::CHAT_HISTORY_SHAPE;
use crate::channel::Channel;
use crate::channel::ChatHistoryChannel;
use crate::error::AgentChatError;
use crate::error::Result;
use crate::reasoning::ReasoningRequest;
use crate::reasoning::ReasoningService;
use crate::serializer::SerializerOptions;
use agentchat_protocol::AgentIdentity;
use agentchat_protocol::AuthorRole;
use agentchat_protocol::Message;
use async_trait::async_trait;
use futures::StreamExt;

/// Default key shared by every chat-history agent.
pub const CHAT_HISTORY_KEY: &str = "chat_history";

/// Agent bound to [`ChatHistoryChannel`]s that delegates each turn to a
/// [`ReasoningService`].
pub struct ChatHistoryAgent<S> {
    identity: AgentIdentity,
    instructions: Option<String>,
    channel_keys: Vec<String>,
    service: S,
}

impl<S: ReasoningService> ChatHistoryAgent<S> {
    pub fn new(identity: AgentIdentity, service: S) -> Self {
        Self {
            identity,
            instructions: None,
            channel_keys: vec![CHAT_HISTORY_KEY.to_string()],
            service,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Replaces the default key set. The first key is the primary channel.
    pub fn with_channel_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.channel_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    fn attribute(&self, message: Message) -> Message {
        let message = match message.role() {
            AuthorRole::Tool | AuthorRole::Agent => message,
            AuthorRole::System | AuthorRole::User => message.with_role(AuthorRole::Agent),
        };
        if message.author_name().is_some() {
            message
        } else {
            message.with_author(self.identity.display_name())
        }
    }
}

#[async_trait]
impl<S: ReasoningService + 'static> Agent for ChatHistoryAgent<S> {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    fn channel_keys(&self) -> Vec<String> {
        self.channel_keys.clone()
    }

    fn channel_shape(&self) -> &'static str {
        CHAT_HISTORY_SHAPE
    }

    async fn create_channel(&self, key: &str) -> Result<Box<dyn Channel>> {
        Ok(Box::new(ChatHistoryChannel::new(key)))
    }

    async fn restore_channel(
        &self,
        key: &str,
        state: &str,
        options: &SerializerOptions,
    ) -> Result<Box<dyn Channel>> {
        let channel = ChatHistoryChannel::restore(key, state, options)?;
        Ok(Box::new(channel))
    }

    fn invoke(&self, history: Vec<Message>) -> MessageStream<'_> {
        let request = ReasoningRequest {
            instructions: self.instructions.clone(),
            history,
        };
        Box::pin(async_stream::stream! {
            let mut replies = self.service.respond(request);
            while let Some(reply) = replies.next().await {
                match reply {
                    Ok(message) => {
                        yield Ok(self.attribute(message));
                    }
                    Err(err) => {
                        tracing::warn!(agent_id = %self.identity.id, "reasoning step failed: {err:#}");
                        yield Err(AgentChatError::invocation(&self.identity.id, format!("{err:#}")));
                        return;
                    }
                }
            }
        })
    }
}
