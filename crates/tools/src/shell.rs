//! Shell tool: risk-gated command execution.
//!
//! Every command passes the banned-path guard first, then the risk
//! classifier. Only `low` commands reach the runner; anything else comes back
//! as a `RiskBlocked` refusal the model sees as its observation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolHandler, param_str};
use deskpilot_security::{BannedPathGuard, RiskTier, classify_command};
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an already-approved command.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ToolError>;
}

/// Runs commands through the platform shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ToolError> {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        };
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "terminal_command".into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: "terminal_command".into(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

/// `terminal_command`: run a shell command after the safety checks pass.
pub struct ShellTool {
    guard: BannedPathGuard,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(guard: BannedPathGuard) -> Self {
        Self::with_runner(guard, Arc::new(SystemRunner))
    }

    pub fn with_runner(guard: BannedPathGuard, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            guard,
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The refusal for `command`, or `None` when it may run.
    pub fn vet(&self, command: &str) -> Option<ToolError> {
        let verdict = self.guard.check(command);
        if verdict.blocked {
            return Some(ToolError::RiskBlocked {
                tier: "banned_path".into(),
                message: format!("BLOCKED: {}", verdict.reason),
            });
        }

        let risk = classify_command(command);
        let message = match risk.tier {
            RiskTier::Low => return None,
            RiskTier::High => format!(
                "HIGH RISK: {}\nCommand: `{command}`\nRequires 3x YES confirmation.",
                risk.explanation
            ),
            RiskTier::Medium => format!(
                "MEDIUM RISK: {}\nCommand: `{command}`\nPlease confirm (YES).",
                risk.explanation
            ),
        };
        Some(ToolError::RiskBlocked {
            tier: risk.tier.to_string(),
            message,
        })
    }
}

#[async_trait]
impl ToolHandler for ShellTool {
    fn name(&self) -> &str {
        "terminal_command"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its output. Risky commands are refused."
    }

    fn usage(&self) -> &str {
        r#"{"command": "ls -la ~/Desktop"}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let command = param_str(params, "command", "").trim();
        if command.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'command' argument".into()));
        }

        if let Some(refusal) = self.vet(command) {
            warn!(command = %command, "Command refused by risk gate");
            return Err(refusal);
        }

        debug!(command = %command, "Executing shell command");
        let output = self.runner.run(command, self.timeout).await?;

        let combined = format!("{}{}", output.stdout, output.stderr);
        let combined = combined.trim();
        if output.success() {
            return Ok(combined.to_string());
        }

        let code = output.exit_code.unwrap_or(-1);
        warn!(command = %command, exit_code = code, "Command exited non-zero");
        Ok(format!("[exit code: {code}]\n{combined}").trim_end().to_string())
    }
}
