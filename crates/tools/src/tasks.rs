//! Task tracking: an in-memory task board plus the `add_task` and
//! `list_tasks` tools that front any `TaskManager`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::collab::{NewTask, Task, TaskManager, TaskSchedule, TaskStatus, Urgency};
use deskpilot_core::error::{CollaboratorError, ToolError};
use deskpilot_core::tool::{ToolHandler, param_str};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tasks kept for the lifetime of the process.
#[derive(Default)]
pub struct TaskBoard {
    tasks: RwLock<Vec<Task>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskManager for TaskBoard {
    async fn add_task(&self, task: NewTask) -> Result<Task, CollaboratorError> {
        let title = task.title.trim();
        if title.is_empty() {
            return Err(CollaboratorError::Rejected("task title is empty".into()));
        }

        let created = Task {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            title: title.to_string(),
            description: task.description,
            priority: task.urgency.priority(),
            urgency: task.urgency,
            schedule: task.schedule,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        };
        self.tasks.write().await.push(created.clone());
        Ok(created)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, CollaboratorError> {
        let mut tasks = self.tasks.read().await.clone();
        tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(tasks)
    }
}

/// `add_task`
pub struct AddTaskTool {
    tasks: Arc<dyn TaskManager>,
}

impl AddTaskTool {
    pub fn new(tasks: Arc<dyn TaskManager>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for AddTaskTool {
    fn name(&self) -> &str {
        "add_task"
    }

    fn description(&self) -> &str {
        "Add a task to the task list."
    }

    fn usage(&self) -> &str {
        r#"{"title": "...", "description": "...", "urgency": "critical|high|normal|low", "schedule": "now|idle|scheduled"}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let new_task = NewTask {
            title: param_str(params, "title", "Untitled Task").to_string(),
            description: param_str(params, "description", "").to_string(),
            urgency: Urgency::parse(param_str(params, "urgency", "normal")),
            schedule: TaskSchedule::parse(param_str(params, "schedule", "now")),
        };

        let task = self.tasks.add_task(new_task).await?;
        Ok(format!(
            "Task created: '{}' [urgency={}, schedule={}, id={}]",
            task.title,
            task.urgency.as_str(),
            task.schedule.as_str(),
            task.id
        ))
    }
}

/// `list_tasks`
pub struct ListTasksTool {
    tasks: Arc<dyn TaskManager>,
}

impl ListTasksTool {
    pub fn new(tasks: Arc<dyn TaskManager>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List all tasks, highest priority first."
    }

    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        let tasks = self.tasks.list_tasks().await?;
        if tasks.is_empty() {
            return Ok("No tasks in the task manager.".to_string());
        }
        let lines: Vec<String> = tasks.iter().map(render_task).collect();
        Ok(format!("Current tasks:\n{}", lines.join("\n")))
    }
}

fn render_task(task: &Task) -> String {
    let status = match task.status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in progress",
        TaskStatus::Completed => "done",
        TaskStatus::Failed => "failed",
        TaskStatus::Paused => "paused",
    };
    let urgency = match task.urgency {
        Urgency::Critical => "[!] ",
        Urgency::High => "[H] ",
        Urgency::Low => "[L] ",
        Urgency::Normal => "",
    };
    let priority = if task.priority != Urgency::Normal.priority() {
        format!(" P{}", task.priority)
    } else {
        String::new()
    };
    format!("- ({status}) {urgency}{}{priority}", task.title)
}
