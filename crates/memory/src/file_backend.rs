//! File-based memory backend: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `MemoryEntry`. Entries are loaded on creation
//! and appended to the file on every save, so a crash loses at most the
//! entry being written.
//!
//! Storage location: `~/.deskpilot/memory/memories.jsonl`

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::error::MemoryError;
use deskpilot_core::memory::{Memory, MemoryEntry, MemorySnippet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A file-backed memory store using JSONL (one JSON object per line).
pub struct FileBackend {
    path: PathBuf,
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl FileBackend {
    /// Create a backend at `path`, loading any existing entries.
    /// A missing file starts empty and is created on first save.
    pub fn new(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "File memory backend loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<MemoryEntry> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory entry");
                    None
                }
            })
            .collect()
    }

    fn ensure_parent(&self) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }
        Ok(())
    }

    fn append_line(&self, entry: &MemoryEntry) -> Result<(), MemoryError> {
        self.ensure_parent()?;
        let line = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory entry: {e}")))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to open memory file: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }
}

#[async_trait]
impl Memory for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, role: &str, content: &str) -> Result<(), MemoryError> {
        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        self.append_line(&entry)?;
        entries.push(entry);
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
        let mut entries = self.entries.write().await;
        self.ensure_parent()?;
        std::fs::write(&self.path, "")
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        entries.clear();
        Ok(())
    }
}
