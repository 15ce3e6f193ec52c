//! Audit trail
//!
//! One record per lifecycle event (item outcome or rollback entry). The core
//! decides what to record; sinks decide where it goes.

use crate::domain::plugin::{ItemStatus, ProcessingResult};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// What the audited event did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Install,
    Update,
    RollbackRestore,
    RollbackRemove,
}

impl AuditAction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "install" => Some(Self::Install),
            "update" => Some(Self::Update),
            "rollback_restore" => Some(Self::RollbackRestore),
            "rollback_remove" => Some(Self::RollbackRemove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::RollbackRestore => "rollback_restore",
            Self::RollbackRemove => "rollback_remove",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the audited event ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failed,
    Incompatible,
    Skipped,
}

impl AuditOutcome {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "incompatible" => Some(Self::Incompatible),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Incompatible => "incompatible",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ItemStatus> for AuditOutcome {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Success => Self::Success,
            ItemStatus::Failed => Self::Failed,
            ItemStatus::Incompatible => Self::Incompatible,
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub batch_id: Option<Uuid>,
    pub slug: String,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub dry_run: bool,
    pub message: String,
}

impl AuditRecord {
    /// Record for a processed item
    pub fn for_result(actor_id: &str, batch_id: Uuid, result: &ProcessingResult) -> Self {
        let action = match result.action {
            crate::domain::plugin::PluginAction::Install => AuditAction::Install,
            crate::domain::plugin::PluginAction::Update => AuditAction::Update,
        };

        Self {
            timestamp: Utc::now(),
            actor_id: actor_id.to_string(),
            batch_id: Some(batch_id),
            slug: result.slug.clone(),
            action,
            outcome: result.status.into(),
            dry_run: result.is_dry_run,
            message: result.messages.join("; "),
        }
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Writes audit records to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        info!(
            target: "plugbatch::audit",
            actor = %record.actor_id,
            batch_id = ?record.batch_id,
            slug = %record.slug,
            action = %record.action,
            outcome = %record.outcome,
            dry_run = record.dry_run,
            "{}",
            record.message
        );
        Ok(())
    }
}

/// Keeps audit records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}
