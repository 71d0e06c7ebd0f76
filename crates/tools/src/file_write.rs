//! File write tool: write a file and confirm it landed.

use std::path::PathBuf;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolHandler, param_str};
use deskpilot_security::expand_tilde;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct FileWriteTool;

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "write_file".into(),
        reason,
    }
}

#[async_trait]
impl ToolHandler for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file, creating parent directories. Overwrites existing files."
    }

    fn usage(&self) -> &str {
        r#"{"path": "~/Desktop/out.txt", "content": "..."}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let raw = param_str(params, "path", "").trim();
        if raw.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'path' argument".into()));
        }
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let path = PathBuf::from(expand_tilde(raw));
        let shown = path.display().to_string();

        if path.is_dir() {
            return Err(failed(format!(
                "Write error: '{shown}' is a directory, not a file. Provide a full file path including filename."
            )));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("Write error: cannot create '{}': {e}", parent.display())))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| failed(format!("Write error: {e}")))?;

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|_| failed(format!("Write error: '{shown}' was not created")))?
            .len();
        debug!(path = %shown, size, "File written");
        Ok(format!("File written: {shown} ({size} bytes)"))
    }
}
