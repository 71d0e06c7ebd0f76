//! Command safety and the transparency journal for DeskPilot.
//!
//! - [`risk`]: classify shell commands into low/medium/high risk tiers
//! - [`path`]: hard-block commands that target protected filesystem roots
//! - [`journal`]: durable record of tool outcomes and lessons

pub mod journal;
pub mod path;
pub mod risk;

pub use journal::{EntryKind, FailurePattern, Journal, JournalEntry, JournalError, format_entry};
pub use path::{BannedPathGuard, PathVerdict, check_banned_paths, expand_tilde};
pub use risk::{RiskAssessment, RiskTier, classify_command};
