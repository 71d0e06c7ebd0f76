//! `deskpilot journal`: read the failure journal.

use deskpilot_config::AppConfig;
use deskpilot_security::{Journal, JournalEntry, format_entry};

use super::{load_config, open_journal};

/// Filters from the command line.
pub struct JournalQuery {
    pub failures: bool,
    pub tool: Option<String>,
    pub limit: usize,
    pub flagged: bool,
    pub json: bool,
}

pub fn run(query: JournalQuery) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let journal = open_journal(&config);

    if query.flagged {
        println!("{}", flagged_report(&journal, &config));
        return Ok(());
    }

    let entries = select(&journal, &query);
    if query.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("  No matching journal entries.");
    } else {
        for entry in &entries {
            println!("{}", format_entry(entry));
        }
    }
    Ok(())
}

fn select(journal: &Journal, query: &JournalQuery) -> Vec<JournalEntry> {
    let limit = query.limit.max(1);
    if query.failures {
        return journal.recent_failures(query.tool.as_deref(), limit);
    }
    let mut entries: Vec<JournalEntry> = journal
        .entries()
        .into_iter()
        .rev()
        .filter(|e| query.tool.as_deref().is_none_or(|t| e.tool == t))
        .take(limit)
        .collect();
    entries.reverse();
    entries
}

fn flagged_report(journal: &Journal, config: &AppConfig) -> String {
    let patterns = journal.repeated_failures(config.journal.healing_window, config.journal.healing_threshold);
    if patterns.is_empty() {
        return format!(
            "  No tool failed {}+ times in the last {} entries.",
            config.journal.healing_threshold, config.journal.healing_window
        );
    }
    patterns
        .iter()
        .map(|p| format!("  {}: {} failures, last error: {}", p.tool, p.count, p.last_error))
        .collect::<Vec<_>>()
        .join("\n")
}
