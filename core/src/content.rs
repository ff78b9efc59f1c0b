//! Resolution of annotation identifiers to stored bytes.
//!
//! The chat only carries file identifiers; callers that want the bytes behind
//! an [`agentchat_protocol::Annotation`] ask a [`ContentStore`].

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, file_id: &str) -> anyhow::Result<Bytes>;
}

/// Content store backed by a map, for tests and local tooling.
#[derive(Default)]
pub struct InMemoryContentStore {
    files: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, file_id: impl Into<String>, content: impl Into<Bytes>) {
        let mut files = self.files.write().await;
        files.insert(file_id.into(), content.into());
    }

    pub async fn remove(&self, file_id: &str) -> Option<Bytes> {
        let mut files = self.files.write().await;
        files.remove(file_id)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn fetch(&self, file_id: &str) -> anyhow::Result<Bytes> {
        let files = self.files.read().await;
        files
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("file `{file_id}` not found"))
    }
}
