//! Task manager and calendar collaborators.
//!
//! The agent reaches these only through the `add_task`, `list_tasks` and
//! `add_calendar_event` tools; it needs their call shapes, not their storage.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// How soon a task needs attention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Urgency {
    /// Lenient parse; unknown values are `Normal`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Urgency::Critical,
            "high" => Urgency::High,
            "low" => Urgency::Low,
            _ => Urgency::Normal,
        }
    }

    /// Priority 1 (highest) to 10 (lowest).
    pub fn priority(&self) -> u8 {
        match self {
            Urgency::Critical => 1,
            Urgency::High => 3,
            Urgency::Normal => 5,
            Urgency::Low => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::High => "high",
            Urgency::Normal => "normal",
            Urgency::Low => "low",
        }
    }
}

/// When a task should be worked on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSchedule {
    #[default]
    Now,
    Idle,
    Scheduled,
}

impl TaskSchedule {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => TaskSchedule::Idle,
            "scheduled" => TaskSchedule::Scheduled,
            _ => TaskSchedule::Now,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSchedule::Now => "now",
            TaskSchedule::Idle => "idle",
            TaskSchedule::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: u8,
    pub urgency: Urgency,
    pub schedule: TaskSchedule,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for `TaskManager::add_task`.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub urgency: Urgency,
    pub schedule: TaskSchedule,
}

#[async_trait]
pub trait TaskManager: Send + Sync {
    async fn add_task(&self, task: NewTask) -> Result<Task, CollaboratorError>;

    /// All tasks, highest priority first.
    async fn list_tasks(&self) -> Result<Vec<Task>, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Lenient parse; `None` for absent, "null", or unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Recurrence::Daily),
            "weekly" => Some(Recurrence::Weekly),
            "monthly" => Some(Recurrence::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: u64,
    pub title: String,
    /// Local wall-clock due time
    pub due: NaiveDateTime,
    /// "reminder", "scheduled_message", "task", "note"
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurrence>,
    /// "user" or "agent"
    pub source: String,
}

/// Input for `Scheduler::add_event`.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub title: String,
    /// Absolute ("2026-03-01 09:00") or relative ("+1h") due time; `None` means one hour from now
    pub due: Option<String>,
    pub kind: String,
    pub recurring: Option<Recurrence>,
    pub source: String,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn add_event(&self, event: NewEvent) -> Result<CalendarEvent, CollaboratorError>;

    /// Upcoming events, soonest first.
    async fn upcoming(&self, limit: usize) -> Result<Vec<CalendarEvent>, CollaboratorError>;

    /// Events whose due time has passed, oldest first.
    async fn overdue(&self) -> Result<Vec<CalendarEvent>, CollaboratorError> {
        Ok(Vec::new())
    }
}
