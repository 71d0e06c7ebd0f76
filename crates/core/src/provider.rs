//! Provider trait: the abstraction over the model runtime.
//!
//! A Provider turns a list of conversation turns into either a complete
//! response or a stream of text chunks. The ReAct controller only ever sees
//! this trait, so tests can script model output without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::message::Turn;

/// A chat request for the model runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "qwen3:30b")
    pub model: String,

    /// The conversation turns
    pub messages: Vec<Turn>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            messages,
            stop: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text
    pub content: String,

    /// Which model actually responded
    pub model: String,

    /// The raw JSON body, for callers that need runtime-specific fields
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// A batch of streamed text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta (may span several model tokens)
    #[serde(default)]
    pub content: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Set on the final chunk when the stream was cut at a fabricated
    /// observation marker
    #[serde(default)]
    pub truncated: bool,
}

/// A model installed in the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
}

impl ModelInfo {
    pub fn size_gb(&self) -> f64 {
        (self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0) * 10.0).round() / 10.0
    }
}

/// Receiving half of a chunk stream.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, GatewayError>>;

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama").
    fn name(&self) -> &str;

    /// The model this provider talks to by default.
    fn model(&self) -> &str;

    /// Send a request and wait for the complete response.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, GatewayError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: response.content,
                done: true,
                truncated: false,
            }))
            .await;
        Ok(rx)
    }

    /// List models installed in the runtime.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        Ok(Vec::new())
    }

    /// Can we reach the runtime?
    async fn health_check(&self) -> bool {
        true
    }
}
