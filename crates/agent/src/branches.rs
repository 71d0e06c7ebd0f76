//! Conversation branches: named snapshots of the carried history and the
//! active goals, saved so a conversation can be rewound to that point.
//!
//! All branches live in one JSON object keyed by branch id, replaced
//! atomically on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use deskpilot_core::error::CollaboratorError;
use deskpilot_core::message::Turn;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A saved conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<Turn>,
    #[serde(default)]
    pub goals: Vec<String>,
    /// Model the conversation was running on
    #[serde(default)]
    pub model: String,
}

/// What `list` shows about a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub messages: usize,
    pub model: String,
}

impl From<&Branch> for BranchSummary {
    fn from(branch: &Branch) -> Self {
        Self {
            id: branch.id.clone(),
            created_at: branch.created_at,
            messages: branch.history.len(),
            model: branch.model.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BranchError {
    #[error("Failed to write branches at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize branches: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to restore goals: {0}")]
    Goals(#[from] CollaboratorError),
}

/// Saved branches, keyed by id.
pub struct BranchStore {
    path: Option<PathBuf>,
    branches: Mutex<BTreeMap<String, Branch>>,
}

impl BranchStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            branches: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open the branch file at `path`. A missing or corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let branches = load_branches(&path);
        debug!(path = %path.display(), branches = branches.len(), "Opened branch store");
        Self {
            path: Some(path),
            branches: Mutex::new(branches),
        }
    }

    /// Save `branch`, replacing any branch with the same id.
    pub async fn save(&self, branch: Branch) -> Result<BranchSummary, BranchError> {
        let summary = BranchSummary::from(&branch);
        let mut branches = self.branches.lock().await;
        branches.insert(branch.id.clone(), branch);
        self.persist(&branches).await?;
        Ok(summary)
    }

    pub async fn get(&self, id: &str) -> Option<Branch> {
        self.branches.lock().await.get(id).cloned()
    }

    /// Every branch, oldest first.
    pub async fn list(&self) -> Vec<BranchSummary> {
        let branches = self.branches.lock().await;
        let mut summaries: Vec<BranchSummary> = branches.values().map(BranchSummary::from).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Remove a branch. Returns `false` when no branch has that id.
    pub async fn delete(&self, id: &str) -> Result<bool, BranchError> {
        let mut branches = self.branches.lock().await;
        if branches.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&branches).await?;
        Ok(true)
    }

    async fn persist(&self, branches: &BTreeMap<String, Branch>) -> Result<(), BranchError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source| BranchError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(branches)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
        Ok(())
    }
}

fn load_branches(path: &Path) -> BTreeMap<String, Branch> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read branches, starting empty");
            return BTreeMap::new();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt branch file, starting empty");
        BTreeMap::new()
    })
}
