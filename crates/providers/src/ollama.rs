//! Ollama model gateway.
//!
//! Talks to the runtime's native `/api/chat` endpoint. Every request goes
//! through the shared [`RequestGate`] with 429 backoff. Streaming responses
//! are NDJSON, one `{"message": {"content": ...}, "done": ...}` object per line.

use std::time::Duration;

use async_trait::async_trait;
use deskpilot_config::ModelConfig;
use deskpilot_core::error::GatewayError;
use deskpilot_core::provider::*;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::gate::{BackoffPolicy, RequestGate, Setup};
use crate::stream::{STOP_SEQUENCES, StreamAccumulator};

/// Gateway to a local Ollama runtime.
pub struct OllamaGateway {
    host: String,
    model: String,
    client: reqwest::Client,
    gate: RequestGate,
    policy: BackoffPolicy,
    request_timeout: Duration,
    stream_timeout: Duration,
    stream_buffer_tokens: usize,
}

impl OllamaGateway {
    /// Create a gateway for `model` on `host`, sharing `gate` with every other
    /// gateway that talks to the same runtime.
    pub fn new(
        host: impl Into<String>,
        model: impl Into<String>,
        gate: RequestGate,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            gate,
            policy: BackoffPolicy::default(),
            request_timeout: Duration::from_secs(120),
            stream_timeout: Duration::from_secs(300),
            stream_buffer_tokens: 1,
        })
    }

    /// Build a gateway from the `[model]` config section.
    pub fn from_config(config: &ModelConfig, gate: RequestGate) -> Result<Self, GatewayError> {
        Ok(Self::new(&config.host, &config.model, gate)?
            .with_backoff(BackoffPolicy::from_secs(
                &config.backoff_schedule_secs,
                config.max_rate_limit_retries,
            ))
            .with_timeouts(
                Duration::from_secs(config.request_timeout_secs),
                Duration::from_secs(config.stream_timeout_secs),
            )
            .with_stream_buffer_tokens(config.stream_buffer_tokens))
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, request: Duration, stream: Duration) -> Self {
        self.request_timeout = request;
        self.stream_timeout = stream;
        self
    }

    pub fn with_stream_buffer_tokens(mut self, tokens: usize) -> Self {
        self.stream_buffer_tokens = tokens.max(1);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Issue a gated, non-streaming call and return the raw JSON body.
    pub async fn request_sync(
        &self,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, GatewayError> {
        let response = self.send_gated(&payload, Deadline::WholeResponse(timeout)).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };
        let stop: Vec<String> = if request.stop.is_empty() {
            STOP_SEQUENCES.iter().map(|s| s.to_string()).collect()
        } else {
            request.stop.clone()
        };

        serde_json::json!({
            "model": model,
            "messages": request.messages,
            "stream": stream,
            "options": { "stop": stop },
        })
    }

    /// Send `payload` to `/api/chat` under the gate, backing off on 429.
    /// Returns once response headers arrive; the body is read outside the gate.
    async fn send_gated(
        &self,
        payload: &serde_json::Value,
        deadline: Deadline,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}/api/chat", self.host);

        self.gate
            .acquire_with_backoff(&self.policy, |attempt| {
                let builder = self.client.post(&url).json(payload);
                let request = match deadline {
                    Deadline::WholeResponse(limit) => builder.timeout(limit),
                    Deadline::Headers(_) => builder,
                };
                let host = self.host.clone();
                async move {
                    debug!(attempt, "Sending chat request");
                    let sent = match deadline {
                        Deadline::WholeResponse(_) => request.send().await,
                        Deadline::Headers(limit) => tokio::time::timeout(limit, request.send())
                            .await
                            .map_err(|_| {
                                GatewayError::Timeout(format!("no response headers within {limit:?}"))
                            })?,
                    };
                    let response = sent.map_err(|e| send_error(&host, e))?;
                    classify(response).await
                }
            })
            .await
    }
}

/// How long a chat request may take.
#[derive(Debug, Clone, Copy)]
enum Deadline {
    /// Covers the request from send to the last body byte.
    WholeResponse(Duration),
    /// Covers only the wait for response headers. Streaming bodies are
    /// bounded per read instead.
    Headers(Duration),
}

/// What the stream reader does after one NDJSON line.
enum LineOutcome {
    Continue,
    Stop,
}

/// Parse one NDJSON line and forward whatever it yields.
async fn forward_line(
    line: &str,
    acc: &mut StreamAccumulator,
    tx: &tokio::sync::mpsc::Sender<Result<StreamChunk, GatewayError>>,
) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Continue;
    }

    let parsed = match serde_json::from_str::<ChatStreamLine>(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            trace!(line = %line, error = %e, "Ignoring unparseable stream line");
            return LineOutcome::Continue;
        }
    };

    if let Some(error) = parsed.error {
        let _ = tx
            .send(Err(GatewayError::Api {
                status_code: 200,
                message: error,
            }))
            .await;
        return LineOutcome::Stop;
    }

    if let Some(message) = parsed.message {
        if let Some(chunk) = acc.push(&message.content) {
            let stop = chunk.done;
            if stop {
                warn!("Model fabricated an observation; stream truncated");
            }
            if tx.send(Ok(chunk)).await.is_err() || stop {
                return LineOutcome::Stop; // receiver dropped or stream cut
            }
        }
    }

    if parsed.done {
        let _ = tx.send(Ok(acc.finish())).await;
        return LineOutcome::Stop;
    }
    LineOutcome::Continue
}

/// Map a transport error onto the gateway taxonomy.
fn send_error(host: &str, e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        GatewayError::Unavailable {
            host: host.to_string(),
            reason: e.to_string(),
        }
    } else if e.is_timeout() {
        GatewayError::Timeout(e.to_string())
    } else {
        GatewayError::StreamInterrupted(e.to_string())
    }
}

async fn classify(response: reqwest::Response) -> Result<Setup<reqwest::Response>, GatewayError> {
    let status = response.status().as_u16();

    if status == 429 {
        return Ok(Setup::RateLimited);
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Model runtime returned error");
        return Err(GatewayError::Api {
            status_code: status,
            message: error_body,
        });
    }

    Ok(Setup::Ready(response))
}

#[async_trait]
impl Provider for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let body = self.chat_body(&request, false);
        let raw = self.request_sync(body, self.request_timeout).await?;

        let content = raw["message"]["content"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidResponse("No message content in response".into()))?
            .to_string();
        let model = raw["model"].as_str().unwrap_or(&request.model).to_string();

        Ok(ChatResponse { content, model, raw })
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, GatewayError> {
        let body = self.chat_body(&request, true);
        debug!(model = %body["model"], messages = request.messages.len(), "Sending streaming request");

        let response = self
            .send_gated(&body, Deadline::Headers(self.stream_timeout))
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let flush_every = self.stream_buffer_tokens;
        let idle_limit = self.stream_timeout;

        // The gate is already released; read the NDJSON body in the background
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            // Raw bytes: a multibyte character may straddle two reads
            let mut buffer: Vec<u8> = Vec::new();
            let mut acc = StreamAccumulator::new(flush_every);

            loop {
                let next = match tokio::time::timeout(idle_limit, byte_stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(?idle_limit, "Model stream went silent");
                        let _ = tx
                            .send(Err(GatewayError::Timeout(format!(
                                "no stream data within {idle_limit:?}"
                            ))))
                            .await;
                        return;
                    }
                };
                let Some(chunk_result) = next else { break };
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GatewayError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    if let LineOutcome::Stop = forward_line(&line, &mut acc, &tx).await {
                        return;
                    }
                }
            }

            // Body ended; a final line may lack its newline
            if !buffer.is_empty() {
                let line = String::from_utf8_lossy(&buffer).into_owned();
                if let LineOutcome::Stop = forward_line(&line, &mut acc, &tx).await {
                    return;
                }
            }
            let _ = tx.send(Ok(acc.finish())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| send_error(&self.host, e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(GatewayError::Api {
                status_code: status,
                message: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                size_bytes: m.size,
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Deserialize)]
struct ChatStreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: u64,
}
