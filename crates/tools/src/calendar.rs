//! Calendar: an in-memory scheduler plus the `add_calendar_event` tool.
//!
//! Due times are local wall-clock. Accepted forms:
//! - `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD HH:MM:SS`, ISO `T` form
//! - the same with `/` instead of `-`
//! - `MM-DD-YYYY` and `DD-MM-YYYY` variants
//! - relative `+30m`, `+1h`, `+2d`, `+1w`
//!
//! No due time means one hour from now.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use deskpilot_core::collab::{CalendarEvent, NewEvent, Recurrence, Scheduler};
use deskpilot_core::error::{CollaboratorError, ToolError};
use deskpilot_core::tool::{ToolHandler, param_opt_str, param_str};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m-%d-%Y", "%d-%m-%Y"];

/// Resolve a user- or model-supplied due time against `now`.
pub fn parse_due(input: &str, now: NaiveDateTime) -> Result<NaiveDateTime, CollaboratorError> {
    let trimmed = input.trim();
    if let Some(relative) = parse_relative(trimmed, now) {
        return Ok(relative);
    }

    let normalized = trimmed.replace('/', "-");
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, fmt) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }

    Err(CollaboratorError::Rejected(format!(
        "Cannot parse date: {input}. Use YYYY-MM-DD HH:MM or YYYY/MM/DD HH:MM format."
    )))
}

fn parse_relative(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let rest = input.strip_prefix('+')?.to_ascii_lowercase();
    let unit = rest.chars().last()?;
    let amount: i64 = rest[..rest.len() - unit.len_utf8()].trim().parse().ok()?;
    let offset = match unit {
        'm' => Duration::try_minutes(amount)?,
        'h' => Duration::try_hours(amount)?,
        'd' => Duration::try_days(amount)?,
        'w' => Duration::try_weeks(amount)?,
        _ => return None,
    };
    now.checked_add_signed(offset)
}

/// Events kept for the lifetime of the process.
#[derive(Default)]
pub struct Calendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Scheduler for Calendar {
    async fn add_event(&self, event: NewEvent) -> Result<CalendarEvent, CollaboratorError> {
        let now = Local::now().naive_local();
        let due = match event.due.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(due) => parse_due(due, now)?,
            None => now + Duration::hours(1),
        };

        let mut events = self.events.write().await;
        let id = events.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let created = CalendarEvent {
            id,
            title: event.title,
            due,
            kind: if event.kind.is_empty() { "reminder".into() } else { event.kind },
            recurring: event.recurring,
            source: if event.source.is_empty() { "user".into() } else { event.source },
        };
        events.push(created.clone());
        Ok(created)
    }

    async fn upcoming(&self, limit: usize) -> Result<Vec<CalendarEvent>, CollaboratorError> {
        let now = Local::now().naive_local();
        let mut upcoming: Vec<CalendarEvent> =
            self.events.read().await.iter().filter(|e| e.due >= now).cloned().collect();
        upcoming.sort_by_key(|e| e.due);
        upcoming.truncate(limit);
        Ok(upcoming)
    }

    async fn overdue(&self) -> Result<Vec<CalendarEvent>, CollaboratorError> {
        let now = Local::now().naive_local();
        let mut overdue: Vec<CalendarEvent> =
            self.events.read().await.iter().filter(|e| e.due < now).cloned().collect();
        overdue.sort_by_key(|e| e.due);
        Ok(overdue)
    }
}

/// `add_calendar_event`
pub struct AddCalendarEventTool {
    scheduler: Arc<dyn Scheduler>,
}

impl AddCalendarEventTool {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl ToolHandler for AddCalendarEventTool {
    fn name(&self) -> &str {
        "add_calendar_event"
    }

    fn description(&self) -> &str {
        "Add a reminder or event to the calendar."
    }

    fn usage(&self) -> &str {
        r#"{"title": "...", "due": "YYYY-MM-DD HH:MM or +1h", "type": "reminder", "recurring": "daily|weekly|monthly|null"}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let recurring = param_opt_str(params, "recurring").and_then(Recurrence::parse);
        let event = NewEvent {
            title: param_str(params, "title", "Untitled Event").to_string(),
            due: param_opt_str(params, "due").map(str::to_string),
            kind: param_str(params, "type", "reminder").to_string(),
            recurring,
            source: "agent".into(),
        };

        let created = self.scheduler.add_event(event).await?;
        let mut text = format!(
            "Calendar event added: '{}' due {}",
            created.title,
            created.due.format("%Y-%m-%dT%H:%M:%S")
        );
        if let Some(recurring) = created.recurring {
            text.push_str(&format!(" (recurring: {})", recurring.as_str()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_absolute_forms() {
        let now = at("2026-01-01 12:00:00");
        assert_eq!(parse_due("2026-03-01 09:30", now).unwrap(), at("2026-03-01 09:30:00"));
        assert_eq!(parse_due("2026/03/01 09:30", now).unwrap(), at("2026-03-01 09:30:00"));
        assert_eq!(parse_due("2026-03-01T09:30:15", now).unwrap(), at("2026-03-01 09:30:15"));
        assert_eq!(parse_due("2026-03-01", now).unwrap(), at("2026-03-01 00:00:00"));
        assert_eq!(parse_due("03/15/2026 08:00", now).unwrap(), at("2026-03-15 08:00:00"));
    }

    #[test]
    fn parses_relative_forms() {
        let now = at("2026-01-01 12:00:00");
        assert_eq!(parse_due("+30m", now).unwrap(), at("2026-01-01 12:30:00"));
        assert_eq!(parse_due("+1h", now).unwrap(), at("2026-01-01 13:00:00"));
        assert_eq!(parse_due("+2D", now).unwrap(), at("2026-01-03 12:00:00"));
        assert_eq!(parse_due("+1w", now).unwrap(), at("2026-01-08 12:00:00"));
    }

    #[test]
    fn rejects_garbage() {
        let now = at("2026-01-01 12:00:00");
        let err = parse_due("next tuesday-ish", now).unwrap_err();
        assert!(err.to_string().contains("Cannot parse date: next tuesday-ish"));
        assert!(parse_due("+5y", now).is_err());
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        let now = at("2026-01-01 12:00:00");
        for due in ["+9999999999999999w", "+9999999999999999d", "+9223372036854775807m"] {
            let err = parse_due(due, now).unwrap_err();
            assert!(err.to_string().contains("Cannot parse date"), "{due}");
        }
    }

    #[tokio::test]
    async fn tool_reports_huge_offset_as_error() {
        let tool = AddCalendarEventTool::new(Arc::new(Calendar::new()));
        let result = tool
            .execute(&obj(json!({"title": "x", "due": "+9999999999999999w"})))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tool_adds_event_and_normalizes_null_recurrence() {
        let calendar = Arc::new(Calendar::new());
        let tool = AddCalendarEventTool::new(calendar.clone());

        let out = tool
            .execute(&obj(json!({"title": "Dentist", "due": "2099-05-01 10:00", "recurring": "null"})))
            .await
            .unwrap();
        assert_eq!(out, "Calendar event added: 'Dentist' due 2099-05-01T10:00:00");

        let out = tool
            .execute(&obj(json!({"title": "Standup", "due": "2099-05-02 09:00", "recurring": "daily"})))
            .await
            .unwrap();
        assert!(out.ends_with("(recurring: daily)"));

        let upcoming = calendar.upcoming(10).await.unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].title, "Dentist");
        assert_eq!(upcoming[0].id, 1);
        assert_eq!(upcoming[1].id, 2);
        assert_eq!(upcoming[0].source, "agent");
        assert_eq!(upcoming[0].recurring, None);
    }

    #[tokio::test]
    async fn missing_due_defaults_to_an_hour_ahead() {
        let calendar = Calendar::new();
        let before = Local::now().naive_local();
        let event = calendar
            .add_event(NewEvent {
                title: "Stretch".into(),
                ..NewEvent::default()
            })
            .await
            .unwrap();
        let delta = event.due - before;
        assert!(delta >= Duration::minutes(59) && delta <= Duration::minutes(61));
        assert_eq!(event.kind, "reminder");
    }

    #[tokio::test]
    async fn past_events_are_not_upcoming() {
        let calendar = Calendar::new();
        calendar
            .add_event(NewEvent {
                title: "Old".into(),
                due: Some("2001-01-01".into()),
                ..NewEvent::default()
            })
            .await
            .unwrap();
        assert!(calendar.upcoming(5).await.unwrap().is_empty());

        let overdue = calendar.overdue().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].title, "Old");
    }
}
