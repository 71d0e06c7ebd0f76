//! No-op memory backend: disables persistent memory entirely.

use async_trait::async_trait;
use deskpilot_core::error::MemoryError;
use deskpilot_core::memory::{Memory, MemorySnippet};

/// A memory that remembers nothing.
pub struct NoopMemory;

#[async_trait]
impl Memory for NoopMemory {
    fn name(&self) -> &str {
        "none"
    }

    async fn save(&self, _role: &str, _content: &str) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<MemorySnippet>, MemoryError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(0)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}
