//! Audit log repository
//!
//! Persists audit records to the `audit_log` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::audit::{AuditAction, AuditOutcome, AuditRecord, AuditSink};
use crate::storage::Database;
use crate::{Error, Result};

/// SQLite-backed audit sink
#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    db: Database,
}

impl SqliteAuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recent records, newest first
    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, actor_id, batch_id, slug, action, outcome, dry_run, message
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Records for one batch, oldest first
    pub async fn for_batch(&self, batch_id: Uuid) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, actor_id, batch_id, slug, action, outcome, dry_run, message
            FROM audit_log
            WHERE batch_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(batch_id.to_string())
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (timestamp, actor_id, batch_id, slug, action, outcome, dry_run, message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.actor_id)
        .bind(record.batch_id.map(|id| id.to_string()))
        .bind(&record.slug)
        .bind(record.action.as_str())
        .bind(record.outcome.as_str())
        .bind(record.dry_run)
        .bind(&record.message)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<AuditRecord> {
    let timestamp: String = row.get("timestamp");
    let batch_id: Option<String> = row.get("batch_id");
    let action: String = row.get("action");
    let outcome: String = row.get("outcome");

    Ok(AuditRecord {
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::Other(format!("Bad audit timestamp '{}': {}", timestamp, e)))?,
        actor_id: row.get("actor_id"),
        batch_id: batch_id.and_then(|id| Uuid::parse_str(&id).ok()),
        slug: row.get("slug"),
        action: AuditAction::from_str(&action)
            .ok_or_else(|| Error::Other(format!("Unknown audit action '{}'", action)))?,
        outcome: AuditOutcome::from_str(&outcome)
            .ok_or_else(|| Error::Other(format!("Unknown audit outcome '{}'", outcome)))?,
        dry_run: row.get("dry_run"),
        message: row.get("message"),
    })
}
