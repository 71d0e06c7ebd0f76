//! Error types for the DeskPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all DeskPilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Collaborator errors (tasks, calendar) ---
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the model runtime.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Model runtime still rate limiting after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Model runtime unreachable at {host}: {reason}")]
    Unavailable { host: String, reason: String },

    #[error("Model request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response from model runtime: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Text shown in the chat transcript when a run ends on this error.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::RateLimited { .. } => "\n\n**The model runtime is busy.** The model is still loading or serving another request. Please try again in a few seconds.\n".to_string(),
            GatewayError::Unavailable { host, .. } => format!(
                "\n\n**Cannot connect to the model runtime at {host}.**\nRun `ollama serve` to start it.\n"
            ),
            other => format!("\n\n**Model error:** {other}\n"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

/// Failures reported by the task manager and calendar collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    /// The risk classifier refused to run a command. `message` is the full
    /// observation text relayed to the model.
    #[error("{message}")]
    RiskBlocked { tier: String, message: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl ToolError {
    /// Whether the dispatcher should try the handler again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ToolError::RiskBlocked { .. })
    }
}
