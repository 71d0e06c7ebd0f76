//! `check_past_failures`: lets the agent read its own failure journal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolHandler, param_opt_str, param_u64};
use deskpilot_security::Journal;
use serde_json::{Map, Value};

use crate::dispatcher::truncate_chars;

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 20;

pub struct PastFailuresTool {
    journal: Arc<Journal>,
}

impl PastFailuresTool {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl ToolHandler for PastFailuresTool {
    fn name(&self) -> &str {
        "check_past_failures"
    }

    fn description(&self) -> &str {
        "Review recent tool failures and the lessons learned from them."
    }

    fn usage(&self) -> &str {
        r#"{"tool": "optional tool name", "limit": 10}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let tool = param_opt_str(params, "tool");
        let limit = param_u64(params, "limit").unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

        let failures = self.journal.recent_failures(tool, usize::MAX);
        if failures.is_empty() {
            let mut text = "No past failures recorded.".to_string();
            if let Some(tool) = tool {
                text.push_str(&format!(" (filtered by tool: {tool})"));
            }
            return Ok(text);
        }

        let mut lines = vec![format!(
            "## Transparency Log: Past Failures ({} entries)",
            failures.len()
        )];
        let start = failures.len().saturating_sub(limit);
        for entry in &failures[start..] {
            let ts = entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
            lines.push(format!("- **{ts}** | `{}`: {}", entry.tool, entry.what_happened));
            if !entry.error.is_empty() {
                lines.push(format!("  Error: {}", truncate_chars(&entry.error, 200)));
            }
            if !entry.lesson.is_empty() {
                lines.push(format!("  Lesson: {}", entry.lesson));
            }
        }
        Ok(lines.join("\n"))
    }
}
