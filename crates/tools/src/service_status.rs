//! Service status tool: is a local service up?
//!
//! `ollama` is checked through the model runtime's model listing; anything
//! else needs a port and gets a plain HTTP request on localhost. Read-only,
//! so results are cacheable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::{ToolHandler, param_str, param_u64};
use serde_json::{Map, Value, json};

const OLLAMA_PORT: u64 = 11434;

pub struct ServiceStatusTool {
    runtime: Arc<dyn Provider>,
    client: reqwest::Client,
    check_host: String,
}

impl ServiceStatusTool {
    pub fn new(runtime: Arc<dyn Provider>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            runtime,
            client,
            check_host: "127.0.0.1".into(),
        }
    }

    async fn ollama_status(&self) -> Value {
        match self.runtime.list_models().await {
            Ok(models) => json!({
                "service": "Ollama",
                "status": "ONLINE",
                "port": OLLAMA_PORT,
                "models_available": models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            }),
            Err(e) => json!({
                "service": "Ollama",
                "status": "OFFLINE",
                "port": OLLAMA_PORT,
                "error": e.to_string(),
            }),
        }
    }

    async fn port_status(&self, service: &str, port: u64) -> Value {
        let url = format!("http://{}:{port}/", self.check_host);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                json!({
                    "service": service,
                    "status": if code < 500 { "ONLINE" } else { "ERROR" },
                    "port": port,
                    "http_status": code,
                })
            }
            Err(_) => json!({
                "service": service,
                "status": "OFFLINE",
                "port": port,
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ServiceStatusTool {
    fn name(&self) -> &str {
        "check_service_status"
    }

    fn description(&self) -> &str {
        "Check whether a local service is running. Use service \"ollama\" or give a port."
    }

    fn usage(&self) -> &str {
        r#"{"service": "ollama", "port": 8188}"#
    }

    fn cacheable(&self) -> bool {
        true
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let service = param_str(params, "service", "").trim();
        let port = param_u64(params, "port");

        let status = match (service.to_lowercase().as_str(), port) {
            ("ollama", None) | ("ollama", Some(OLLAMA_PORT)) => self.ollama_status().await,
            (_, Some(port)) => self.port_status(service, port).await,
            (_, None) => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown service '{service}'. Provide a port number or use: ollama"
                )));
            }
        };

        serde_json::to_string_pretty(&status).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "check_service_status".into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StaticRuntime;
    use axum::{Router, http::StatusCode, routing::get};

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn serve(status: StatusCode) -> u16 {
        let app = Router::new().route("/", get(move || async move { status }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn ollama_reports_models() {
        let tool = ServiceStatusTool::new(Arc::new(StaticRuntime::online(&["qwen3:8b", "llava:7b"])));
        let out = tool.execute(&obj(json!({"service": "ollama"}))).await.unwrap();
        let status: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(status["status"], "ONLINE");
        assert_eq!(status["models_available"], json!(["qwen3:8b", "llava:7b"]));
    }

    #[tokio::test]
    async fn ollama_offline() {
        let tool = ServiceStatusTool::new(Arc::new(StaticRuntime::offline()));
        let out = tool.execute(&obj(json!({"service": "Ollama"}))).await.unwrap();
        let status: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(status["status"], "OFFLINE");
    }

    #[tokio::test]
    async fn port_check_classifies_http_status() {
        let tool = ServiceStatusTool::new(Arc::new(StaticRuntime::offline()));

        let ok_port = serve(StatusCode::NOT_FOUND).await;
        let out = tool.execute(&obj(json!({"service": "comfyui", "port": ok_port}))).await.unwrap();
        let status: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(status["status"], "ONLINE");
        assert_eq!(status["http_status"], 404);

        let broken_port = serve(StatusCode::BAD_GATEWAY).await;
        let out = tool.execute(&obj(json!({"service": "proxy", "port": broken_port}))).await.unwrap();
        let status: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(status["status"], "ERROR");
    }

    #[tokio::test]
    async fn closed_port_is_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let tool = ServiceStatusTool::new(Arc::new(StaticRuntime::offline()));
        let out = tool.execute(&obj(json!({"service": "x", "port": port}))).await.unwrap();
        let status: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(status["status"], "OFFLINE");
    }

    #[tokio::test]
    async fn unknown_service_without_port() {
        let tool = ServiceStatusTool::new(Arc::new(StaticRuntime::offline()));
        let err = tool.execute(&obj(json!({"service": "redis"}))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid tool arguments: Unknown service 'redis'. Provide a port number or use: ollama"
        );
    }

    #[test]
    fn is_cacheable() {
        assert!(ServiceStatusTool::new(Arc::new(StaticRuntime::offline())).cacheable());
    }
}
