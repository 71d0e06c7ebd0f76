//! Active goals: standing objectives the agent keeps in view across runs.
//!
//! Goals are plain strings kept oldest first and persisted as a JSON array.
//! The controller names the most recent few in the system prompt; the
//! `set_goal` and `complete_goal` tools let the model manage them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::error::{CollaboratorError, ToolError};
use deskpilot_core::tool::{ToolHandler, param_str};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// The active goal list.
pub struct GoalBoard {
    path: Option<PathBuf>,
    goals: RwLock<Vec<String>>,
}

impl GoalBoard {
    /// Goals that live only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            goals: RwLock::new(Vec::new()),
        }
    }

    /// Open the goal file at `path`. A missing or corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let goals = load_goals(&path);
        debug!(path = %path.display(), goals = goals.len(), "Opened goal board");
        Self {
            path: Some(path),
            goals: RwLock::new(goals),
        }
    }

    /// Every active goal, oldest first.
    pub async fn active(&self) -> Vec<String> {
        self.goals.read().await.clone()
    }

    /// The `n` most recently set goals, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<String> {
        let goals = self.goals.read().await;
        goals[goals.len().saturating_sub(n)..].to_vec()
    }

    /// Add a goal. Returns `false` when it is already active.
    pub async fn add(&self, goal: &str) -> Result<bool, CollaboratorError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(CollaboratorError::Rejected("goal is empty".into()));
        }
        let mut goals = self.goals.write().await;
        if goals.iter().any(|g| g.eq_ignore_ascii_case(goal)) {
            return Ok(false);
        }
        goals.push(goal.to_string());
        self.save(&goals).await?;
        Ok(true)
    }

    /// Retire the goal matching `query`: an exact match first, then a single
    /// case-insensitive substring match. Returns the retired goal.
    pub async fn complete(&self, query: &str) -> Result<Option<String>, CollaboratorError> {
        let query = query.trim();
        let mut goals = self.goals.write().await;

        let index = match goals.iter().position(|g| g == query) {
            Some(index) => Some(index),
            None => {
                let needle = query.to_lowercase();
                let hits: Vec<usize> = goals
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| !needle.is_empty() && g.to_lowercase().contains(&needle))
                    .map(|(i, _)| i)
                    .collect();
                match hits.as_slice() {
                    [only] => Some(*only),
                    [] => None,
                    _ => {
                        return Err(CollaboratorError::Rejected(format!(
                            "'{query}' matches {} goals; be more specific",
                            hits.len()
                        )));
                    }
                }
            }
        };

        let Some(index) = index else {
            return Ok(None);
        };
        let done = goals.remove(index);
        self.save(&goals).await?;
        Ok(Some(done))
    }

    /// Swap in a whole goal list, as when a conversation branch is restored.
    pub async fn replace(&self, goals: Vec<String>) -> Result<(), CollaboratorError> {
        let mut current = self.goals.write().await;
        *current = goals;
        self.save(&current).await
    }

    async fn save(&self, goals: &[String]) -> Result<(), CollaboratorError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let storage = |e: std::io::Error| CollaboratorError::Storage(format!("{}: {e}", path.display()));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage)?;
        }
        let json = serde_json::to_string_pretty(goals).map_err(|e| CollaboratorError::Storage(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(storage)?;
        tokio::fs::rename(&tmp, path).await.map_err(storage)?;
        Ok(())
    }
}

fn load_goals(path: &Path) -> Vec<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read goals, starting empty");
            return Vec::new();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt goal file, starting empty");
        Vec::new()
    })
}

/// `set_goal`
pub struct SetGoalTool {
    goals: Arc<GoalBoard>,
}

impl SetGoalTool {
    pub fn new(goals: Arc<GoalBoard>) -> Self {
        Self { goals }
    }
}

#[async_trait]
impl ToolHandler for SetGoalTool {
    fn name(&self) -> &str {
        "set_goal"
    }

    fn description(&self) -> &str {
        "Record a standing goal that stays in view across conversations."
    }

    fn usage(&self) -> &str {
        r#"{"goal": "..."}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let goal = param_str(params, "goal", "").trim();
        if goal.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'goal' argument".into()));
        }
        if self.goals.add(goal).await? {
            Ok(format!("Goal set: {goal}"))
        } else {
            Ok(format!("Goal already active: {goal}"))
        }
    }
}

/// `complete_goal`
pub struct CompleteGoalTool {
    goals: Arc<GoalBoard>,
}

impl CompleteGoalTool {
    pub fn new(goals: Arc<GoalBoard>) -> Self {
        Self { goals }
    }
}

#[async_trait]
impl ToolHandler for CompleteGoalTool {
    fn name(&self) -> &str {
        "complete_goal"
    }

    fn description(&self) -> &str {
        "Mark an active goal as achieved and drop it from the goal list."
    }

    fn usage(&self) -> &str {
        r#"{"goal": "text or part of the goal"}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let query = param_str(params, "goal", "").trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'goal' argument".into()));
        }
        match self.goals.complete(query).await? {
            Some(done) => Ok(format!("Goal completed: {done}")),
            None => Err(ToolError::ExecutionFailed {
                tool_name: "complete_goal".into(),
                reason: format!("No active goal matches '{query}'"),
            }),
        }
    }
}
