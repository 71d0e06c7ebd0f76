//! File read tool: read a file, or list a directory.

use std::path::PathBuf;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolHandler, param_str};
use deskpilot_security::expand_tilde;
use serde_json::{Map, Value};

use crate::dispatcher::truncate_chars;

pub const DEFAULT_READ_LIMIT: usize = 5000;
const LISTING_LIMIT: usize = 50;

pub struct FileReadTool {
    /// Maximum characters returned from a file
    limit: usize,
}

impl FileReadTool {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_READ_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "read_file".into(),
            reason,
        }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file, or list the contents of a directory."
    }

    fn usage(&self) -> &str {
        r#"{"path": "~/Desktop/notes.txt"}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let raw = param_str(params, "path", "").trim();
        if raw.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'path' argument".into()));
        }
        let path = PathBuf::from(expand_tilde(raw));
        let shown = path.display().to_string();

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| Self::failed(format!("File not found: {shown}")))?;

        if metadata.is_dir() {
            let mut reader = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| Self::failed(format!("Read error: {e}")))?;
            let mut entries = Vec::new();
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|e| Self::failed(format!("Read error: {e}")))?
            {
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                let name = entry.file_name().to_string_lossy().to_string();
                entries.push(if is_dir { format!("[DIR] {name}") } else { name });
            }
            entries.sort();
            entries.truncate(LISTING_LIMIT);
            return Ok(format!("'{shown}' is a directory. Contents:\n{}", entries.join("\n")));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Self::failed(format!("Read error: {e}")))?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(truncate_chars(&content, self.limit).to_string())
    }
}
