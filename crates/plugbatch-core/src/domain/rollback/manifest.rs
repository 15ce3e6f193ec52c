//! Batch manifest entity
//!
//! The durable record of a completed batch: what each item did and which
//! backup can undo it.

use crate::domain::backup::BackupHandle;
use crate::domain::plugin::{BatchReport, ItemStatus, PluginAction, ProcessingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item of a recorded batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub slug: String,
    pub action: PluginAction,

    /// Status the item finished the batch with
    pub status: ItemStatus,

    pub previous_version: Option<String>,
    pub new_version: String,

    /// Backup to restore for a successful update
    pub backup: Option<BackupHandle>,

    /// Identifier the activation primitive knows the plugin by
    pub plugin_id: String,

    /// Whether the plugin was active when the batch finished
    pub activated: bool,
}

impl ManifestEntry {
    /// Build an entry from a processing result
    pub fn from_result(result: &ProcessingResult) -> Self {
        Self {
            slug: result.slug.clone(),
            action: result.action,
            status: result.status,
            previous_version: result.previous_version.clone(),
            new_version: result.new_version.clone(),
            backup: result.backup.clone(),
            plugin_id: result.slug.clone(),
            activated: result.activated,
        }
    }

    /// Build entries for every result of a batch report
    pub fn from_report(report: &BatchReport) -> Vec<Self> {
        report.results.iter().map(Self::from_result).collect()
    }
}

/// A recorded batch, kept until its retention window closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

impl BatchManifest {
    /// Whether the recorded expiry has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Entries that took effect and therefore have something to undo
    pub fn reversible_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| e.status.took_effect())
    }

    /// Human-readable time left before expiry
    pub fn display_remaining(&self, now: DateTime<Utc>) -> String {
        let remaining = self.expires_at - now;
        if remaining <= chrono::Duration::zero() {
            "expired".to_string()
        } else if remaining.num_hours() > 0 {
            format!("{}h {}m", remaining.num_hours(), remaining.num_minutes() % 60)
        } else {
            format!("{}m", remaining.num_minutes().max(1))
        }
    }
}
