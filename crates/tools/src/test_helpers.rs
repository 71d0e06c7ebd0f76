//! Test doubles for tool and dispatcher tests.

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::ToolHandler;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Succeeds with a fixed output and counts invocations.
pub struct CountingTool {
    name: String,
    output: String,
    cacheable: bool,
    pub calls: AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: output.to_string(),
            cacheable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn cacheable(name: &str, output: &str) -> Self {
        Self {
            cacheable: true,
            ..Self::new(name, output)
        }
    }
}

#[async_trait]
impl ToolHandler for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Counts calls."
    }
    fn cacheable(&self) -> bool {
        self.cacheable
    }
    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Fails on every call.
pub struct FailingTool {
    name: String,
    reason: String,
    pub calls: AtomicUsize,
}

impl FailingTool {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolHandler for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Always fails."
    }
    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: self.reason.clone(),
        })
    }
}

/// Fails `failures` times, then succeeds.
pub struct FlakyTool {
    name: String,
    failures: usize,
    output: String,
    pub calls: AtomicUsize,
}

impl FlakyTool {
    pub fn new(name: &str, failures: usize, output: &str) -> Self {
        Self {
            name: name.to_string(),
            failures,
            output: output.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolHandler for FlakyTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Fails, then recovers."
    }
    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("transient failure {}", call + 1),
            });
        }
        Ok(self.output.clone())
    }
}

/// Refuses every call the way the risk gate does.
pub struct RefusingTool {
    name: String,
    message: String,
    pub calls: AtomicUsize,
}

impl RefusingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolHandler for RefusingTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Refuses."
    }
    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::RiskBlocked {
            tier: "high".into(),
            message: self.message.clone(),
        })
    }
}

/// A model runtime that only answers model listings.
pub struct StaticRuntime {
    models: Option<Vec<deskpilot_core::ModelInfo>>,
}

impl StaticRuntime {
    pub fn online(names: &[&str]) -> Self {
        Self {
            models: Some(
                names
                    .iter()
                    .map(|name| deskpilot_core::ModelInfo {
                        name: name.to_string(),
                        size_bytes: 5_200_000_000,
                    })
                    .collect(),
            ),
        }
    }

    pub fn offline() -> Self {
        Self { models: None }
    }
}

#[async_trait]
impl deskpilot_core::Provider for StaticRuntime {
    fn name(&self) -> &str {
        "static"
    }

    fn model(&self) -> &str {
        "static-model"
    }

    async fn complete(
        &self,
        _request: deskpilot_core::ChatRequest,
    ) -> Result<deskpilot_core::ChatResponse, deskpilot_core::GatewayError> {
        Err(deskpilot_core::GatewayError::InvalidResponse("not scripted".into()))
    }

    async fn list_models(&self) -> Result<Vec<deskpilot_core::ModelInfo>, deskpilot_core::GatewayError> {
        self.models.clone().ok_or_else(|| deskpilot_core::GatewayError::Unavailable {
            host: "http://localhost:11434".into(),
            reason: "connection refused".into(),
        })
    }
    async fn health_check(&self) -> bool {
        self.models.is_some()
    }
}

type Reply = Box<dyn Fn(&str, &str) -> Result<String, deskpilot_core::GatewayError> + Send + Sync>;

/// A model runtime that answers completions through a closure of
/// `(model, prompt)` and records every call.
pub struct ScriptedRuntime {
    models: Vec<String>,
    reply: Reply,
    pub calls: std::sync::Mutex<Vec<(String, String)>>,
}

impl ScriptedRuntime {
    pub fn new(
        models: &[&str],
        reply: impl Fn(&str, &str) -> Result<String, deskpilot_core::GatewayError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            reply: Box::new(reply),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every prompt sent so far, with the model it went to.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl deskpilot_core::Provider for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or("scripted-model")
    }

    async fn complete(
        &self,
        request: deskpilot_core::ChatRequest,
    ) -> Result<deskpilot_core::ChatResponse, deskpilot_core::GatewayError> {
        let prompt = request.messages.last().map(|t| t.content.clone()).unwrap_or_default();
        self.calls.lock().unwrap().push((request.model.clone(), prompt.clone()));
        let content = (self.reply)(&request.model, &prompt)?;
        Ok(deskpilot_core::ChatResponse {
            content,
            model: request.model,
            raw: Value::Null,
        })
    }

    async fn list_models(&self) -> Result<Vec<deskpilot_core::ModelInfo>, deskpilot_core::GatewayError> {
        Ok(self
            .models
            .iter()
            .map(|name| deskpilot_core::ModelInfo {
                name: name.clone(),
                size_bytes: 1_000_000_000,
            })
            .collect())
    }
}
