//! Transparency journal: durable record of tool outcomes.
//!
//! Every tool success, failure, and lesson is appended here. The journal is
//! what the agent consults when asked about past failures, and what the
//! controller scans for tools that keep failing. The file keeps only the most
//! recent `max_entries` and is replaced atomically (write temp, then rename).
//!
//! Appends never wait on the disk while holding the entry lock. Inside a
//! Tokio runtime the file write runs on the blocking pool; a newer snapshot
//! always wins over an older one that lands late.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// What kind of event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Failure,
    Success,
    Lesson,
    Recovery,
}

impl EntryKind {
    fn icon(&self) -> &'static str {
        match self {
            EntryKind::Failure => "X",
            EntryKind::Success => "OK",
            EntryKind::Lesson => "L",
            EntryKind::Recovery => "R",
        }
    }
}

/// A single journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub tool: String,
    pub what_happened: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub lesson: String,
    #[serde(default)]
    pub model: String,
}

/// A tool that failed repeatedly within the scanned window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePattern {
    pub tool: String,
    pub count: usize,
    pub last_error: String,
}

/// Journal persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Failed to write journal at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize journal: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The transparency journal.
pub struct Journal {
    max_entries: usize,
    model: Mutex<String>,
    entries: Mutex<Vec<JournalEntry>>,
    /// Entries appended since open; orders snapshots for the writer
    appended: AtomicU64,
    writer: Option<Arc<DiskWriter>>,
}

/// Serializes file writes and drops snapshots older than the one on disk.
#[derive(Debug)]
struct DiskWriter {
    path: PathBuf,
    last_written: Mutex<u64>,
}

impl DiskWriter {
    fn write(&self, seq: u64, entries: &[JournalEntry]) -> Result<(), JournalError> {
        let mut last = lock_or_recover(&self.last_written);
        if seq <= *last {
            return Ok(());
        }
        persist(&self.path, entries)?;
        *last = seq;
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path())
            .field("entry_count", &self.len())
            .finish()
    }
}

impl Journal {
    /// Open the journal at `path`, loading existing entries.
    ///
    /// An unreadable or corrupt file is logged and treated as empty; the next
    /// append replaces it.
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        debug!(path = %path.display(), entries = entries.len(), "Opened transparency journal");
        Self {
            max_entries: max_entries.max(1),
            model: Mutex::new(String::new()),
            entries: Mutex::new(entries),
            appended: AtomicU64::new(0),
            writer: Some(Arc::new(DiskWriter {
                path,
                last_written: Mutex::new(0),
            })),
        }
    }

    /// A journal that is never written to disk.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            model: Mutex::new(String::new()),
            entries: Mutex::new(Vec::new()),
            appended: AtomicU64::new(0),
            writer: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.writer.as_ref().map(|w| w.path.as_path())
    }

    /// Model name stamped on subsequent entries.
    pub fn set_model(&self, model: impl Into<String>) {
        *lock_or_recover(&self.model) = model.into();
    }

    /// Append an entry and persist the bounded journal.
    ///
    /// Inside a Tokio runtime the write is handed to the blocking pool and
    /// its failures are logged; otherwise it runs inline and errors return.
    pub fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let Some((seq, snapshot)) = self.push(entry) else {
            return Ok(());
        };
        let Some(writer) = &self.writer else {
            return Ok(());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let writer = Arc::clone(writer);
                handle.spawn_blocking(move || {
                    if let Err(e) = writer.write(seq, &snapshot) {
                        error!(error = %e, "Failed to save transparency journal");
                    }
                });
                Ok(())
            }
            Err(_) => writer.write(seq, &snapshot),
        }
    }

    /// Write the current bounded journal to disk now, on this thread.
    pub fn flush(&self) -> Result<(), JournalError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let (seq, snapshot) = {
            let entries = lock_or_recover(&self.entries);
            (self.appended.load(Ordering::SeqCst), self.bounded(&entries))
        };
        if seq == 0 {
            return Ok(());
        }
        writer.write(seq, &snapshot)
    }

    /// Push under the entry lock and take the snapshot to persist, if any.
    fn push(&self, entry: JournalEntry) -> Option<(u64, Vec<JournalEntry>)> {
        let mut entries = lock_or_recover(&self.entries);
        entries.push(entry);
        let seq = self.appended.fetch_add(1, Ordering::SeqCst) + 1;
        self.writer.as_ref()?;
        Some((seq, self.bounded(&entries)))
    }

    fn bounded(&self, entries: &[JournalEntry]) -> Vec<JournalEntry> {
        let start = entries.len().saturating_sub(self.max_entries);
        entries[start..].to_vec()
    }

    /// Build and append an entry. Persistence failures are logged, never raised.
    pub fn record(
        &self,
        kind: EntryKind,
        tool: &str,
        what_happened: impl Into<String>,
        error: impl Into<String>,
        lesson: impl Into<String>,
    ) {
        let model = lock_or_recover(&self.model).clone();
        let entry = JournalEntry {
            timestamp: Utc::now(),
            kind,
            tool: tool.to_string(),
            what_happened: what_happened.into(),
            error: error.into(),
            lesson: lesson.into(),
            model,
        };

        if let Err(e) = self.append(entry) {
            error!(error = %e, "Failed to save transparency journal");
        }
    }

    pub fn record_failure(&self, tool: &str, what_happened: impl Into<String>, error: impl Into<String>) {
        self.record(EntryKind::Failure, tool, what_happened, error, "");
    }

    pub fn record_success(&self, tool: &str, what_happened: impl Into<String>) {
        self.record(EntryKind::Success, tool, what_happened, "", "");
    }

    pub fn record_lesson(&self, tool: &str, what_happened: impl Into<String>, lesson: impl Into<String>) {
        self.record(EntryKind::Lesson, tool, what_happened, "", lesson);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        lock_or_recover(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent `limit` failures, oldest first, optionally for one tool.
    pub fn recent_failures(&self, tool: Option<&str>, limit: usize) -> Vec<JournalEntry> {
        let entries = lock_or_recover(&self.entries);
        let mut failures: Vec<JournalEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.kind == EntryKind::Failure)
            .filter(|e| tool.is_none_or(|t| e.tool == t))
            .take(limit)
            .cloned()
            .collect();
        failures.reverse();
        failures
    }

    /// Human-readable digest of the last `limit` entries.
    pub fn summarize(&self, limit: usize) -> String {
        let entries = lock_or_recover(&self.entries);
        if entries.is_empty() {
            return "No transparency entries yet.".into();
        }
        let start = entries.len().saturating_sub(limit);
        entries[start..]
            .iter()
            .map(format_entry)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tools with at least `threshold` failures among the last `window` entries.
    pub fn repeated_failures(&self, window: usize, threshold: usize) -> Vec<FailurePattern> {
        let entries = lock_or_recover(&self.entries);
        let start = entries.len().saturating_sub(window);

        let mut counts: HashMap<&str, (usize, &str)> = HashMap::new();
        for entry in entries[start..].iter().filter(|e| e.kind == EntryKind::Failure) {
            let slot = counts.entry(entry.tool.as_str()).or_insert((0, ""));
            slot.0 += 1;
            slot.1 = entry.error.as_str();
        }

        let mut patterns: Vec<FailurePattern> = counts
            .into_iter()
            .filter(|(_, (count, _))| *count >= threshold)
            .map(|(tool, (count, last_error))| FailurePattern {
                tool: tool.to_string(),
                count,
                last_error: last_error.to_string(),
            })
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
        patterns
    }
}

/// One or two lines: `[X] 2026-03-01 09:15 | tool: what` plus an optional lesson.
pub fn format_entry(entry: &JournalEntry) -> String {
    let ts = entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let what: String = entry.what_happened.chars().take(100).collect();
    let mut line = format!("[{}] {ts} | {}: {what}", entry.kind.icon(), entry.tool);
    if !entry.lesson.is_empty() {
        line.push_str(&format!("\n    Learned: {}", entry.lesson));
    }
    line
}

/// A writer that panicked mid-append leaves at worst one extra entry, so a
/// poisoned lock is recovered rather than turned into lost entries.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Journal lock poisoned by a panicked thread; recovering");
        poisoned.into_inner()
    })
}

fn load_entries(path: &Path) -> Vec<JournalEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read journal, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt journal, starting empty");
            Vec::new()
        }
    }
}

fn persist(path: &Path, entries: &[JournalEntry]) -> Result<(), JournalError> {
    let write_err = |source| JournalError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
