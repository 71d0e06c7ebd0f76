//! `daily_debrief`: a status digest of tasks, calendar, goals, recent
//! failures and runtime health, closed by model-suggested next actions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use deskpilot_core::collab::{Scheduler, TaskManager, TaskStatus};
use deskpilot_core::error::ToolError;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::ToolHandler;
use deskpilot_security::Journal;
use serde_json::{Map, Value};
use tracing::warn;

use crate::dispatcher::truncate_chars;
use crate::goals::GoalBoard;
use crate::subagent::ask;

const UPCOMING_EVENTS: usize = 5;
const LISTED_ITEMS: usize = 3;
const LISTED_GOALS: usize = 5;
const SUGGESTION_CHARS: usize = 400;

pub struct DailyDebriefTool {
    runtime: Arc<dyn Provider>,
    tasks: Arc<dyn TaskManager>,
    scheduler: Arc<dyn Scheduler>,
    goals: Arc<GoalBoard>,
    journal: Arc<Journal>,
}

impl DailyDebriefTool {
    pub fn new(
        runtime: Arc<dyn Provider>,
        tasks: Arc<dyn TaskManager>,
        scheduler: Arc<dyn Scheduler>,
        goals: Arc<GoalBoard>,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            runtime,
            tasks,
            scheduler,
            goals,
            journal,
        }
    }

    async fn task_section(&self, out: &mut Vec<String>) {
        let tasks = match self.tasks.list_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "Debrief could not read tasks");
                out.push(format!("### Tasks\n- unavailable: {e}"));
                return;
            }
        };
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        out.push("### Tasks".into());
        out.push(format!("- **Pending**: {}", count(TaskStatus::Pending)));
        out.push(format!("- **In Progress**: {}", count(TaskStatus::InProgress)));
        out.push(format!("- **Completed**: {}", count(TaskStatus::Completed)));
        for task in tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
            .take(LISTED_ITEMS)
        {
            out.push(format!("  - P{} {}", task.priority, task.title));
        }
    }

    async fn calendar_section(&self, out: &mut Vec<String>) {
        out.push(String::new());
        out.push("### Calendar".into());
        let upcoming = self.scheduler.upcoming(UPCOMING_EVENTS).await.unwrap_or_else(|e| {
            warn!(error = %e, "Debrief could not read upcoming events");
            Vec::new()
        });
        let overdue = self.scheduler.overdue().await.unwrap_or_else(|e| {
            warn!(error = %e, "Debrief could not read overdue events");
            Vec::new()
        });

        out.push(format!("- **Upcoming**: {}", upcoming.len()));
        if !overdue.is_empty() {
            out.push(format!("- **Due now**: {}", overdue.len()));
            for event in &overdue {
                out.push(format!("  - {} (due {})", event.title, event.due.format("%Y-%m-%d %H:%M")));
            }
        }
        for event in upcoming.iter().take(LISTED_ITEMS) {
            out.push(format!("  - {}: {}", event.due.format("%Y-%m-%d %H:%M"), event.title));
        }
    }
}

#[async_trait]
impl ToolHandler for DailyDebriefTool {
    fn name(&self) -> &str {
        "daily_debrief"
    }

    fn description(&self) -> &str {
        "Daily debrief: tasks, calendar, goals, recent failures and runtime health, with suggested next actions."
    }

    async fn execute(&self, _params: &Map<String, Value>) -> Result<String, ToolError> {
        let now = Local::now();
        let mut sections: Vec<String> = Vec::new();

        self.task_section(&mut sections).await;
        self.calendar_section(&mut sections).await;

        let goals = self.goals.active().await;
        if !goals.is_empty() {
            sections.push(String::new());
            sections.push("### Active Goals".into());
            sections.extend(goals.iter().take(LISTED_GOALS).map(|g| format!("- {g}")));
        }

        let failures = self.journal.recent_failures(None, LISTED_ITEMS);
        if !failures.is_empty() {
            sections.push(String::new());
            sections.push("### Recent Failures".into());
            for entry in &failures {
                sections.push(format!("- `{}`: {}", entry.tool, truncate_chars(&entry.what_happened, 100)));
            }
        }

        let online = self.runtime.health_check().await;
        sections.push(String::new());
        sections.push("### System Health".into());
        sections.push(format!("- **Model runtime**: {}", if online { "Online" } else { "Offline" }));
        sections.push(format!("- **Model**: {}", self.runtime.model()));
        sections.push(format!("- **Time**: {}", now.format("%H:%M:%S")));

        let status = sections.join("\n");
        let prompt = format!(
            "Given this daily status:\n{status}\n\nSuggest 3 specific next actions. Be brief and actionable."
        );
        let mut report = format!("## Daily Debrief: {}\n{status}", now.format("%Y-%m-%d %H:%M"));
        if online {
            match ask(self.runtime.as_ref(), self.runtime.model(), prompt).await {
                Ok(suggestions) if !suggestions.is_empty() => {
                    report.push_str("\n\n### Suggested Next Actions\n");
                    report.push_str(truncate_chars(&suggestions, SUGGESTION_CHARS));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Debrief suggestions failed"),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Calendar;
    use crate::tasks::TaskBoard;
    use crate::test_helpers::{ScriptedRuntime, StaticRuntime};
    use deskpilot_core::collab::{NewEvent, NewTask, Urgency};

    struct Fixture {
        tasks: Arc<TaskBoard>,
        calendar: Arc<Calendar>,
        goals: Arc<GoalBoard>,
        journal: Arc<Journal>,
    }

    fn fixture() -> Fixture {
        Fixture {
            tasks: Arc::new(TaskBoard::new()),
            calendar: Arc::new(Calendar::new()),
            goals: Arc::new(GoalBoard::in_memory()),
            journal: Arc::new(Journal::in_memory(50)),
        }
    }

    fn tool(f: &Fixture, runtime: Arc<dyn Provider>) -> DailyDebriefTool {
        DailyDebriefTool::new(
            runtime,
            f.tasks.clone(),
            f.calendar.clone(),
            f.goals.clone(),
            f.journal.clone(),
        )
    }

    #[tokio::test]
    async fn debrief_covers_every_section() {
        let f = fixture();
        f.tasks
            .add_task(NewTask {
                title: "Fix prod".into(),
                urgency: Urgency::Critical,
                ..NewTask::default()
            })
            .await
            .unwrap();
        for (title, due) in [("Dentist", "2099-05-01 10:00"), ("Pay rent", "2001-01-01 09:00")] {
            f.calendar
                .add_event(NewEvent {
                    title: title.into(),
                    due: Some(due.into()),
                    ..NewEvent::default()
                })
                .await
                .unwrap();
        }
        f.goals.add("ship v1").await.unwrap();
        f.journal.record_failure("web_search", "Attempt 1: timeout", "timeout");

        let runtime = Arc::new(ScriptedRuntime::new(&["qwen3:30b"], |_, _| {
            Ok("1. Fix prod\n2. Pay rent\n3. Ship v1".into())
        }));
        let out = tool(&f, runtime.clone()).execute(&Map::new()).await.unwrap();

        assert!(out.starts_with("## Daily Debrief: "));
        assert!(out.contains("- **Pending**: 1\n- **In Progress**: 0\n- **Completed**: 0\n  - P1 Fix prod"));
        assert!(out.contains("- **Upcoming**: 1\n- **Due now**: 1\n  - Pay rent (due 2001-01-01 09:00)"));
        assert!(out.contains("  - 2099-05-01 10:00: Dentist"));
        assert!(out.contains("### Active Goals\n- ship v1"));
        assert!(out.contains("### Recent Failures\n- `web_search`: Attempt 1: timeout"));
        assert!(out.contains("- **Model runtime**: Online\n- **Model**: qwen3:30b"));
        assert!(out.ends_with("### Suggested Next Actions\n1. Fix prod\n2. Pay rent\n3. Ship v1"));

        let calls = runtime.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.starts_with("Given this daily status:\n### Tasks"));
    }

    #[tokio::test]
    async fn offline_runtime_skips_suggestions() {
        let f = fixture();
        let out = tool(&f, Arc::new(StaticRuntime::offline())).execute(&Map::new()).await.unwrap();
        assert!(out.contains("- **Pending**: 0"));
        assert!(!out.contains("### Active Goals"));
        assert!(!out.contains("Suggested Next Actions"));
    }
}
