//! Message and annotation models.

use serde::Deserialize;
use serde::Serialize;

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    System,
    User,
    Agent,
    Tool,
}

impl std::fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AuthorRole::System => "system",
            AuthorRole::User => "user",
            AuthorRole::Agent => "agent",
            AuthorRole::Tool => "tool",
        };
        f.write_str(label)
    }
}

/// A quoted span of message text that points at externally stored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Annotation {
    /// The text in the message that the annotation covers.
    pub quote: String,
    /// Opaque identifier understood by a content store.
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
}

impl Annotation {
    pub fn new(quote: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            quote: quote.into(),
            file_id: file_id.into(),
            start_index: None,
            end_index: None,
        }
    }

    #[must_use]
    pub fn with_span(mut self, start_index: usize, end_index: usize) -> Self {
        self.start_index = Some(start_index);
        self.end_index = Some(end_index);
        self
    }
}

/// Structured content carried alongside (or instead of) a message's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ContentItem {
    Text { text: String },
    Annotation(Annotation),
    FileReference { file_id: String },
}

/// Stable identity of a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub name: Option<String>,
}

impl AgentIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The name to show for this participant, falling back to its id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// One immutable unit of conversational content.
///
/// Fields are private so a message cannot change after it has been handed to a
/// channel; the `with_*` builders consume the value and are meant to be used
/// before the message is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    id: String,
    role: AuthorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default)]
    items: Vec<ContentItem>,
}

impl Message {
    pub fn new(role: AuthorRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            author_name: None,
            content: Some(content.into()),
            items: Vec::new(),
        }
    }

    /// A message whose payload is entirely structured.
    pub fn structured(role: AuthorRole, items: Vec<ContentItem>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            author_name: None,
            content: None,
            items,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::Agent, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::Tool, content)
    }

    #[must_use]
    pub fn with_author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = Some(author_name.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: AuthorRole) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_item(mut self, item: ContentItem) -> Self {
        self.items.push(item);
        self
    }

    #[must_use]
    pub fn with_annotation(self, annotation: Annotation) -> Self {
        self.with_item(ContentItem::Annotation(annotation))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> AuthorRole {
        self.role
    }

    pub fn author_name(&self) -> Option<&str> {
        self.author_name.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    /// Annotations in the order they were attached.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.items.iter().filter_map(|item| match item {
            ContentItem::Annotation(annotation) => Some(annotation),
            _ => None,
        })
    }

    /// Every external content identifier this message refers to.
    pub fn file_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ContentItem::Annotation(annotation) => Some(annotation.file_id.as_str()),
                ContentItem::FileReference { file_id } => Some(file_id.as_str()),
                ContentItem::Text { .. } => None,
            })
            .collect()
    }

    /// Text content, joined with any `Text` items.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(content) = self.content.as_deref() {
            parts.push(content);
        }
        for item in &self.items {
            if let ContentItem::Text { text } = item {
                parts.push(text);
            }
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn user_message_has_role_and_content() {
        let msg = Message::user("Which segment had the most sales?");
        assert_eq!(msg.role(), AuthorRole::User);
        assert_eq!(msg.content(), Some("Which segment had the most sales?"));
        assert_eq!(msg.author_name(), None);
        assert!(!msg.id().is_empty());
        assert!(msg.items().is_empty());
    }

    #[test]
    fn each_message_gets_a_distinct_id() {
        assert_ne!(Message::user("a").id(), Message::user("a").id());
    }

    #[test]
    fn annotations_and_file_ids_follow_item_order() {
        let msg = Message::agent("see report")
            .with_author("analyst")
            .with_annotation(Annotation::new("report.tsv", "file-1").with_span(4, 10))
            .with_item(ContentItem::FileReference {
                file_id: "file-2".to_string(),
            });

        let quotes: Vec<&str> = msg.annotations().map(|a| a.quote.as_str()).collect();
        assert_eq!(quotes, vec!["report.tsv"]);
        assert_eq!(msg.file_ids(), vec!["file-1", "file-2"]);
        assert_eq!(msg.author_name(), Some("analyst"));
    }

    #[test]
    fn text_joins_content_and_text_items() {
        let msg = Message::structured(
            AuthorRole::Tool,
            vec![
                ContentItem::Text {
                    text: "first".to_string(),
                },
                ContentItem::Text {
                    text: "second".to_string(),
                },
            ],
        );
        assert_eq!(msg.content(), None);
        assert_eq!(msg.text(), "first\nsecond");
    }

    #[test]
    fn serialized_shape_is_stable() {
        let msg = Message::agent("done")
            .with_author("analyst")
            .with_annotation(Annotation::new("q", "file-9"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], json!("agent"));
        assert_eq!(value["author_name"], json!("analyst"));
        assert_eq!(
            value["items"],
            json!([{ "type": "annotation", "quote": "q", "file_id": "file-9" }])
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = json!({
            "id": "m1",
            "role": "user",
            "content": "hi",
            "items": [],
            "mood": "cheerful"
        });
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let raw = json!({ "id": "m1", "role": "narrator", "items": [] });
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn identity_display_name_falls_back_to_id() {
        assert_eq!(AgentIdentity::new("a-1").display_name(), "a-1");
        assert_eq!(
            AgentIdentity::new("a-1").with_name("Analyst").display_name(),
            "Analyst"
        );
    }
}
