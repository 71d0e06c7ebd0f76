//! Shared plumbing for tools that consult models on their own: one-shot
//! completions and installed-model lookup.

use deskpilot_core::error::{GatewayError, ToolError};
use deskpilot_core::message::Turn;
use deskpilot_core::provider::{ChatRequest, Provider};

/// One non-streaming prompt to `model`, answered as plain text.
pub async fn ask(runtime: &dyn Provider, model: &str, prompt: impl Into<String>) -> Result<String, GatewayError> {
    let request = ChatRequest::new(model, vec![Turn::user(prompt)]);
    let response = runtime.complete(request).await?;
    Ok(response.content.trim().to_string())
}

/// Names of the installed models, or a tool failure naming `tool`.
pub async fn installed_models(runtime: &dyn Provider, tool: &str) -> Result<Vec<String>, ToolError> {
    let models = runtime.list_models().await.map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool.to_string(),
        reason: format!("Cannot list installed models: {e}"),
    })?;
    Ok(models.into_iter().map(|m| m.name).collect())
}

/// Match `wanted` against `available`: exact name first, then the first
/// case-insensitive partial match ("qwen3" finds "qwen3:30b").
pub fn resolve_model(available: &[String], wanted: &str) -> Option<String> {
    if let Some(exact) = available.iter().find(|m| m.as_str() == wanted) {
        return Some(exact.clone());
    }
    let wanted = wanted.to_lowercase();
    available
        .iter()
        .find(|m| !wanted.is_empty() && m.to_lowercase().contains(&wanted))
        .cloned()
}

/// Embedding models cannot chat.
pub fn is_chat_model(name: &str) -> bool {
    !name.to_lowercase().contains("embed")
}
