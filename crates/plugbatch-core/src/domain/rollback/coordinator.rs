//! Batch rollback coordinator
//!
//! Records a manifest for each completed batch and, on request, reverts the
//! items that took effect: updates are restored from their backup and fresh
//! installs are removed. Entries are attempted one after another and a
//! failure on one never stops the rest.

use super::manifest::{BatchManifest, ManifestEntry};
use super::store::{KeyValueStore, expiry_from};
use crate::domain::audit::{AuditAction, AuditOutcome, AuditRecord, AuditSink, TracingAuditSink};
use crate::domain::backup::{BackupError, BackupStore};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::lifecycle::{ActivationController, DEFAULT_ACTOR, PluginPaths};
use crate::domain::plugin::PluginAction;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key prefix for manifests in the key-value store
pub const MANIFEST_KEY_PREFIX: &str = "batch_manifest:";

/// Default retention window
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Longest retention window accepted
pub const MAX_RETENTION_HOURS: u32 = 720;

/// Rollback settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSettings {
    /// Hours a manifest stays available for rollback
    pub retention_hours: u32,
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_RETENTION_HOURS,
        }
    }
}

impl RollbackSettings {
    pub fn new(retention_hours: u32) -> Result<Self> {
        if !(1..=MAX_RETENTION_HOURS).contains(&retention_hours) {
            return Err(Error::InvalidInput(format!(
                "retention_hours must be between 1 and {}, got {}",
                MAX_RETENTION_HOURS, retention_hours
            )));
        }
        Ok(Self { retention_hours })
    }

    /// Manifest TTL in seconds
    pub fn ttl_seconds(&self) -> u64 {
        u64::from(self.retention_hours) * 3600
    }
}

/// Why a single entry could not be reverted
#[derive(Debug, thiserror::Error)]
pub enum RollbackEntryError {
    #[error("No backup was recorded for '{0}'")]
    MissingBackup(String),

    #[error("Cannot resolve plugin directory: {0}")]
    Path(String),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Outcome of reverting one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackEntryStatus {
    Success,
    Failed,
    Skipped,
}

impl RollbackEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RollbackEntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<RollbackEntryStatus> for AuditOutcome {
    fn from(status: RollbackEntryStatus) -> Self {
        match status {
            RollbackEntryStatus::Success => Self::Success,
            RollbackEntryStatus::Failed => Self::Failed,
            RollbackEntryStatus::Skipped => Self::Skipped,
        }
    }
}

/// Per-entry rollback result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntryResult {
    pub slug: String,
    pub action: PluginAction,
    pub status: RollbackEntryStatus,
    pub message: String,
}

/// Outcome of a batch rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub batch_id: String,

    /// True when no attempted entry failed
    pub success: bool,

    /// Every entry in manifest order, skipped ones included
    pub results: Vec<RollbackEntryResult>,

    /// The failed subset of `results`
    pub failures: Vec<RollbackEntryResult>,
}

impl RollbackReport {
    pub fn reverted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == RollbackEntryStatus::Success)
            .count()
    }
}

/// Records batch manifests and reverts them on request
pub struct BatchRollbackCoordinator {
    store: Arc<dyn KeyValueStore>,
    backups: Arc<dyn BackupStore>,
    paths: Arc<dyn PluginPaths>,
    activation: Option<Arc<dyn ActivationController>>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: RollbackSettings,
    actor_id: String,
}

impl BatchRollbackCoordinator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        backups: Arc<dyn BackupStore>,
        paths: Arc<dyn PluginPaths>,
        settings: RollbackSettings,
    ) -> Self {
        Self {
            store,
            backups,
            paths,
            activation: None,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            settings,
            actor_id: DEFAULT_ACTOR.to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deactivate removed installs that were active
    pub fn with_activation(mut self, activation: Arc<dyn ActivationController>) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }

    pub fn settings(&self) -> RollbackSettings {
        self.settings
    }

    fn key(batch_id: &str) -> String {
        format!("{}{}", MANIFEST_KEY_PREFIX, batch_id)
    }

    /// Persist a manifest for `batch_id`, replacing any earlier one
    pub async fn record_batch(
        &self,
        batch_id: &str,
        entries: Vec<ManifestEntry>,
    ) -> Result<BatchManifest> {
        if batch_id.trim().is_empty() {
            return Err(Error::InvalidInput("batch id must not be empty".to_string()));
        }

        let created_at = self.clock.now();
        let ttl = self.settings.ttl_seconds();
        let manifest = BatchManifest {
            batch_id: batch_id.to_string(),
            created_at,
            expires_at: expiry_from(created_at, ttl),
            entries,
        };

        let value = serde_json::to_string(&manifest)?;
        self.store.set(&Self::key(batch_id), &value, ttl).await?;

        info!(
            batch_id,
            entries = manifest.entries.len(),
            retention_hours = self.settings.retention_hours,
            "Recorded batch manifest"
        );
        Ok(manifest)
    }

    /// Every manifest still held by the store, newest first
    pub async fn get_active_batches(&self) -> Result<Vec<BatchManifest>> {
        let mut manifests: Vec<BatchManifest> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|(key, _)| key.starts_with(MANIFEST_KEY_PREFIX))
            .filter_map(|(key, value)| parse_manifest(&key, &value))
            .collect();

        manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(manifests)
    }

    pub async fn get_batch_manifest(&self, batch_id: &str) -> Result<Option<BatchManifest>> {
        let key = Self::key(batch_id);
        Ok(self
            .store
            .get(&key)
            .await?
            .and_then(|value| parse_manifest(&key, &value)))
    }

    /// Delete manifests whose recorded expiry has passed
    ///
    /// Backup storage is not touched here; it is pruned by age separately.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;

        for (key, value) in self.store.list_all().await? {
            if !key.starts_with(MANIFEST_KEY_PREFIX) {
                continue;
            }
            let Some(manifest) = parse_manifest(&key, &value) else {
                continue;
            };
            if manifest.is_expired(now) && self.store.delete(&key).await? {
                debug!(batch_id = %manifest.batch_id, "Removed expired manifest");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Cleaned up expired batch manifests");
        }
        Ok(removed)
    }

    /// Revert every entry of a recorded batch that took effect
    ///
    /// Entries that did not take effect are reported as skipped. The
    /// manifest is deleted only when nothing failed, so a partial rollback
    /// can be retried.
    pub async fn rollback_batch(&self, batch_id: &str) -> Result<RollbackReport> {
        let manifest = self
            .get_batch_manifest(batch_id)
            .await?
            .ok_or_else(|| Error::BatchNotFound(batch_id.to_string()))?;

        info!(batch_id, entries = manifest.entries.len(), "Rolling back batch");

        let mut results = Vec::with_capacity(manifest.entries.len());
        for entry in &manifest.entries {
            let result = self.rollback_entry(entry).await;
            self.audit(batch_id, entry, &result).await;
            results.push(result);
        }

        let failures: Vec<_> = results
            .iter()
            .filter(|r| r.status == RollbackEntryStatus::Failed)
            .cloned()
            .collect();
        let success = failures.is_empty();

        if success {
            self.store.delete(&Self::key(batch_id)).await?;
            info!(batch_id, "Batch rolled back");
        } else {
            warn!(
                batch_id,
                failures = failures.len(),
                "Batch rollback incomplete; manifest kept for retry"
            );
        }

        Ok(RollbackReport {
            batch_id: batch_id.to_string(),
            success,
            results,
            failures,
        })
    }

    async fn rollback_entry(&self, entry: &ManifestEntry) -> RollbackEntryResult {
        let make = |status, message: String| RollbackEntryResult {
            slug: entry.slug.clone(),
            action: entry.action,
            status,
            message,
        };

        if !entry.status.took_effect() {
            return make(
                RollbackEntryStatus::Skipped,
                format!("Skipped: item finished as {}; nothing to undo", entry.status),
            );
        }

        match self.revert(entry).await {
            Ok(message) => make(RollbackEntryStatus::Success, message),
            Err(e) => {
                warn!(slug = %entry.slug, error = %e, "Rollback entry failed");
                make(RollbackEntryStatus::Failed, e.to_string())
            }
        }
    }

    async fn revert(&self, entry: &ManifestEntry) -> std::result::Result<String, RollbackEntryError> {
        let target = self
            .paths
            .plugin_dir(&entry.slug)
            .map_err(|e| RollbackEntryError::Path(e.to_string()))?;

        match entry.action {
            PluginAction::Update => {
                let handle = entry
                    .backup
                    .as_ref()
                    .ok_or_else(|| RollbackEntryError::MissingBackup(entry.slug.clone()))?;
                self.backups.restore_backup(handle, &target).await?;

                Ok(match &entry.previous_version {
                    Some(previous) => format!("Restored version {}", previous),
                    None => "Restored previous version".to_string(),
                })
            }
            PluginAction::Install => {
                self.backups.remove_partial_install(&target).await?;

                let mut message = format!("Removed {}", entry.slug);
                if entry.activated {
                    if let Some(activation) = &self.activation {
                        if let Err(e) = activation.deactivate(&entry.plugin_id).await {
                            warn!(slug = %entry.slug, error = %e, "Deactivation after removal failed");
                            message.push_str(&format!("; deactivation failed: {}", e));
                        }
                    }
                }
                Ok(message)
            }
        }
    }

    async fn audit(&self, batch_id: &str, entry: &ManifestEntry, result: &RollbackEntryResult) {
        let action = match entry.action {
            PluginAction::Update => AuditAction::RollbackRestore,
            PluginAction::Install => AuditAction::RollbackRemove,
        };
        let record = AuditRecord {
            timestamp: self.clock.now(),
            actor_id: self.actor_id.clone(),
            batch_id: uuid::Uuid::parse_str(batch_id).ok(),
            slug: entry.slug.clone(),
            action,
            outcome: result.status.into(),
            dry_run: false,
            message: result.message.clone(),
        };
        if let Err(e) = self.audit.record(&record).await {
            warn!(slug = %entry.slug, error = %e, "Failed to write audit record");
        }
    }
}

fn parse_manifest(key: &str, value: &str) -> Option<BatchManifest> {
    match serde_json::from_str(value) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!(key, error = %e, "Ignoring unreadable batch manifest");
            None
        }
    }
}
