//! Model listing tool: which models does the runtime have installed?

use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::ToolHandler;
use serde_json::{Map, Value, json};

pub struct OllamaModelsTool {
    runtime: Arc<dyn Provider>,
}

impl OllamaModelsTool {
    pub fn new(runtime: Arc<dyn Provider>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ToolHandler for OllamaModelsTool {
    fn name(&self) -> &str {
        "list_ollama_models"
    }

    fn description(&self) -> &str {
        "List the models installed in the local Ollama runtime, with sizes."
    }

    fn cacheable(&self) -> bool {
        true
    }

    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        let models = self
            .runtime
            .list_models()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_ollama_models".into(),
                reason: format!("Cannot list Ollama models: {e}"),
            })?;

        let listing: Vec<Value> = models
            .iter()
            .map(|m| json!({"name": m.name, "size_gb": m.size_gb()}))
            .collect();
        serde_json::to_string_pretty(&listing).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "list_ollama_models".into(),
            reason: e.to_string(),
        })
    }
}
