//! SQLite-backed key-value store
//!
//! Rows past their `expires_at` are invisible to reads and are purged
//! opportunistically on `list_all`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::Result;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::rollback::KeyValueStore;
use crate::domain::rollback::store::expiry_from;
use crate::storage::Database;

/// Key-value store over the `kv_store` table
pub struct SqliteKvStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteKvStore {
    /// Create a new store on an open database
    pub fn new(db: Database) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let expires_at = expiry_from(self.clock.now(), ttl_seconds).timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, expires_at, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_store WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(self.now_millis())
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<(String, String)>> {
        let now = self.now_millis();

        let purged = sqlx::query("DELETE FROM kv_store WHERE expires_at <= ?")
            .bind(now)
            .execute(self.db.pool())
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired key-value entries");
        }

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM kv_store WHERE expires_at > ? ORDER BY key")
                .bind(now)
                .fetch_all(self.db.pool())
                .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use chrono::Duration;

    async fn store_with_clock() -> (SqliteKvStore, ManualClock) {
        let db = Database::in_memory().await.expect("Failed to create database");
        let clock = ManualClock::default();
        let store = SqliteKvStore::new(db).with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    #[tokio::test]
    async fn test_set_get_overwrite_delete() {
        let (store, _) = store_with_clock().await;

        store.set("batch_manifest:a", "one", 60).await.unwrap();
        store.set("batch_manifest:a", "two", 60).await.unwrap();
        assert_eq!(
            store.get("batch_manifest:a").await.unwrap().as_deref(),
            Some("two")
        );

        assert!(store.delete("batch_manifest:a").await.unwrap());
        assert!(!store.delete("batch_manifest:a").await.unwrap());
        assert!(store.get("batch_manifest:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_rows_are_invisible() {
        let (store, clock) = store_with_clock().await;

        store.set("short", "1", 60).await.unwrap();
        store.set("long", "2", 7200).await.unwrap();
        clock.advance(Duration::minutes(5));

        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(
            store.list_all().await.unwrap(),
            vec![("long".to_string(), "2".to_string())]
        );

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_store")
            .fetch_one(store.db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
