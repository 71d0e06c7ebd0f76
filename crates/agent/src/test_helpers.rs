//! Shared test doubles for controller tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deskpilot_core::error::{GatewayError, ToolError};
use deskpilot_core::provider::{ChatRequest, ChatResponse, ChunkReceiver, Provider, StreamChunk};
use deskpilot_core::tool::ToolHandler;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A gateway that streams scripted step texts, one script entry per call.
///
/// Each entry is either the chunks of one streamed response or an error.
/// Once the script runs out every call streams an empty response. Requests
/// are recorded for inspection.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<Vec<String>, GatewayError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<Vec<String>, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One whole-text chunk per step.
    pub fn steps(steps: &[&str]) -> Self {
        Self::new(steps.iter().map(|s| Ok(vec![s.to_string()])).collect())
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ChatRequest) -> Result<Vec<String>, GatewayError> {
        self.requests.lock().unwrap().push(request);
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl Provider for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let model = request.model.clone();
        let content = self.next(request)?.concat();
        Ok(ChatResponse {
            content,
            model,
            raw: Value::Null,
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, GatewayError> {
        let chunks = self.next(request)?;
        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        for content in chunks {
            let _ = tx.try_send(Ok(StreamChunk {
                content,
                done: false,
                truncated: false,
            }));
        }
        let _ = tx.try_send(Ok(StreamChunk {
            content: String::new(),
            done: true,
            truncated: false,
        }));
        Ok(rx)
    }
}

/// Returns a fixed output and counts calls.
pub struct EchoTool {
    name: String,
    output: String,
    pub calls: AtomicUsize,
}

impl EchoTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: output.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Returns a fixed output."
    }
    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Fails on every call.
pub struct BrokenTool {
    name: String,
}

impl BrokenTool {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl ToolHandler for BrokenTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Always fails."
    }
    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: "permission denied".into(),
        })
    }
}
