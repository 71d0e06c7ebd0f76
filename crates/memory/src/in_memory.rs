//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::error::MemoryError;
use deskpilot_core::memory::{Memory, MemoryEntry, MemorySnippet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory backend that stores memories in a Vec.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, oldest first.
    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl Memory for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, role: &str, content: &str) -> Result<(), MemoryError> {
        self.entries.write().await.push(MemoryEntry {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemorySnippet>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(crate::rank(&entries, query, limit))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
