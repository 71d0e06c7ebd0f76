//! Tool handler trait and registry.
//!
//! Tools are what give the agent the ability to act on the host:
//! run shell commands, read/write files, check services, manage tasks.
//! Every handler returns a typed `Result`, so a misbehaving tool can only
//! ever produce an error value for the dispatcher to journal and retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ToolError;

/// A tool invocation parsed from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub tool: String,

    /// Parameters; an empty object when the model gave none or they did not parse
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, params: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            tool: tool.into(),
            params,
        }
    }

    /// Build a call from a JSON value, treating anything but an object as "no params".
    pub fn from_value(tool: impl Into<String>, params: serde_json::Value) -> Self {
        let params = match params {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self::new(tool, params)
    }
}

/// The core tool handler trait.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The unique name of this tool (e.g., "terminal_command").
    fn name(&self) -> &str;

    /// A one-line description shown to the model.
    fn description(&self) -> &str;

    /// Example parameter object shown to the model (e.g., `{"path": "..."}`).
    fn usage(&self) -> &str {
        "{}"
    }

    /// Read-only, idempotent tools may have their results cached.
    fn cacheable(&self) -> bool {
        false
    }

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: &serde_json::Map<String, serde_json::Value>) -> Result<String, ToolError>;
}

/// A registry of available tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool list for the system prompt, one `- name: description. usage` line per tool.
    pub fn catalog(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {} {}", t.name(), t.description(), t.usage()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read a string parameter, falling back to `default` when absent or not a string.
pub fn param_str<'a>(
    params: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
    default: &'a str,
) -> &'a str {
    params.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

/// Read an optional string parameter, treating empty strings and `"null"` as absent.
pub fn param_opt_str<'a>(
    params: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("none"))
}

/// Read an integer parameter. Models sometimes quote numbers, so strings are parsed too.
pub fn param_u64(params: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<u64> {
    match params.get(key)? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
