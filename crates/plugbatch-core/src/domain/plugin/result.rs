//! Processing results and batch summaries

use super::descriptor::PluginAction;
use crate::domain::backup::BackupHandle;
use crate::domain::compatibility::CompatibilityIssue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Terminal status of one processed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed,
    Incompatible,
}

impl ItemStatus {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "incompatible" => Some(Self::Incompatible),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Incompatible => "incompatible",
        }
    }

    /// Whether the item took effect on disk
    pub fn took_effect(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of processing one descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub slug: String,
    pub action: PluginAction,
    pub status: ItemStatus,
    pub activated: bool,

    /// Human-readable notices in the order they were produced; never empty
    pub messages: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatibility_issues: Vec<CompatibilityIssue>,

    pub is_dry_run: bool,

    /// Version installed before this item ran
    #[serde(default)]
    pub previous_version: Option<String>,

    /// Version the package carried
    pub new_version: String,

    /// Backup still owned by this item, if one was retained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupHandle>,
}

impl ProcessingResult {
    /// Whether the item succeeded
    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }

    /// Whether any message mentions the given text (case-insensitive)
    pub fn has_message_containing(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.messages
            .iter()
            .any(|m| m.to_lowercase().contains(&needle))
    }
}

/// Aggregate counters for a batch
///
/// `installed + updated + failed + incompatible == total` holds after every
/// call to [`BatchSummary::record`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub installed: usize,
    pub updated: usize,
    pub failed: usize,
    pub incompatible: usize,
}

impl BatchSummary {
    /// Build a summary from a list of results
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ProcessingResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.record(result);
        }
        summary
    }

    /// Count one result
    pub fn record(&mut self, result: &ProcessingResult) {
        self.total += 1;
        match (result.status, result.action) {
            (ItemStatus::Success, PluginAction::Install) => self.installed += 1,
            (ItemStatus::Success, PluginAction::Update) => self.updated += 1,
            (ItemStatus::Failed, _) => self.failed += 1,
            (ItemStatus::Incompatible, _) => self.incompatible += 1,
        }
    }

    /// Items that were installed or updated
    pub fn succeeded(&self) -> usize {
        self.installed + self.updated
    }

    /// Items that failed or were rejected as incompatible
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.incompatible
    }

    /// Check the counter invariant
    pub fn is_consistent(&self) -> bool {
        self.installed + self.updated + self.failed + self.incompatible == self.total
    }

    /// Process exit code for a CLI caller
    ///
    /// 0 when nothing was unsuccessful, 2 when nothing succeeded, 1 for a mix.
    pub fn exit_code(&self) -> i32 {
        if self.unsuccessful() == 0 {
            0
        } else if self.succeeded() == 0 {
            2
        } else {
            1
        }
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ProcessingResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    /// Exit code derived from the summary
    pub fn exit_code(&self) -> i32 {
        self.summary.exit_code()
    }

    /// Results that took effect
    pub fn successful(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Find the result for a slug
    pub fn result_for(&self, slug: &str) -> Option<&ProcessingResult> {
        self.results.iter().find(|r| r.slug == slug)
    }
}
