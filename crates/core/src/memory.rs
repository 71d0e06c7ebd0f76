//! Memory trait: the agent's long-term recall collaborator.
//!
//! The controller saves the user message and the cleaned final answer of
//! every run, and recalls ranked snippets for the next prompt. Storage and
//! ranking are the backend's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory
    pub id: String,

    /// Who said it ("user", "assistant")
    pub role: String,

    /// The content of the memory
    pub content: String,

    /// When this memory was created
    pub created_at: DateTime<Utc>,
}

/// A recalled memory with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub content: String,

    #[serde(default)]
    pub score: f32,

    /// Backend-specific metadata (role, timestamp, source)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The core Memory trait.
///
/// Implementations: file (JSONL), in-memory (for testing), none (no-op).
#[async_trait]
pub trait Memory: Send + Sync {
    /// The backend name (e.g., "file", "in_memory", "none").
    fn name(&self) -> &str;

    /// Save a message.
    async fn save(&self, role: &str, content: &str) -> Result<(), MemoryError>;

    /// Search memories, most relevant first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemorySnippet>, MemoryError>;

    /// Total memory count.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Clear all memories.
    async fn clear(&self) -> Result<(), MemoryError>;
}
