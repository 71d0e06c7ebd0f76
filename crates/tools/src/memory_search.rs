//! Memory search tool: lets the agent query its own long-term memory.

use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::memory::Memory;
use deskpilot_core::tool::{ToolHandler, param_str, param_u64};
use serde_json::{Map, Value};

use crate::dispatcher::truncate_chars;

pub struct MemorySearchTool {
    memory: Arc<dyn Memory>,
}

impl MemorySearchTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl ToolHandler for MemorySearchTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search long-term memory for past conversations and facts."
    }

    fn usage(&self) -> &str {
        r#"{"query": "search terms", "n": 5}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let query = param_str(params, "query", "").trim();
        if query.is_empty() {
            return Ok(r#"No query provided. Use: search_memory({"query": "search terms"})"#.to_string());
        }
        let limit = param_u64(params, "n").unwrap_or(5).clamp(1, 50) as usize;

        let results = self.memory.search(query, limit).await?;
        if results.is_empty() {
            return Ok(format!("No memories found matching '{query}'."));
        }

        let lines: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, snippet)| {
                let role = snippet.metadata.get("role").and_then(|v| v.as_str()).unwrap_or("memory");
                let ts = snippet
                    .metadata
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .map(|ts| truncate_chars(ts, 19))
                    .unwrap_or("");
                format!("{}. [{role}] ({ts}) {}", i + 1, truncate_chars(&snippet.content, 200))
            })
            .collect();

        Ok(format!(
            "Found {} memories matching '{query}':\n{}",
            results.len(),
            lines.join("\n")
        ))
    }
}
