//! Activation registry
//!
//! Records which plugins are active in the `plugin_activations` table.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::lifecycle::{ActivationController, ActivationError, PluginPaths};
use crate::storage::Database;

/// Activation state persisted in SQLite
pub struct SqliteActivationRegistry {
    db: Database,
    paths: Arc<dyn PluginPaths>,
}

fn storage_error(e: sqlx::Error) -> ActivationError {
    ActivationError::Storage(e.to_string())
}

impl SqliteActivationRegistry {
    pub fn new(db: Database, paths: Arc<dyn PluginPaths>) -> Self {
        Self { db, paths }
    }

    /// Slugs of every active plugin, alphabetically
    pub async fn active_plugins(&self) -> Result<Vec<String>, ActivationError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT slug FROM plugin_activations ORDER BY slug")
                .fetch_all(self.db.pool())
                .await
                .map_err(storage_error)?;

        Ok(rows.into_iter().map(|(slug,)| slug).collect())
    }
}

#[async_trait]
impl ActivationController for SqliteActivationRegistry {
    async fn is_active(&self, slug: &str) -> Result<bool, ActivationError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM plugin_activations WHERE slug = ?")
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await
            .map_err(storage_error)?;

        Ok(row.is_some())
    }

    async fn activate(&self, slug: &str, network_wide: bool) -> Result<(), ActivationError> {
        let dir = self
            .paths
            .plugin_dir(slug)
            .map_err(|e| ActivationError::Refused(e.to_string()))?;
        let installed = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !installed {
            return Err(ActivationError::NotInstalled(slug.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO plugin_activations (slug, network_wide, activated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(slug) DO UPDATE SET network_wide = excluded.network_wide
            "#,
        )
        .bind(slug)
        .bind(network_wide)
        .execute(self.db.pool())
        .await
        .map_err(storage_error)?;

        tracing::debug!(slug, network_wide, "Plugin activated");
        Ok(())
    }

    async fn deactivate(&self, slug: &str) -> Result<(), ActivationError> {
        sqlx::query("DELETE FROM plugin_activations WHERE slug = ?")
            .bind(slug)
            .execute(self.db.pool())
            .await
            .map_err(storage_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::paths::PluginDirectory;
    use tempfile::TempDir;

    async fn registry() -> (SqliteActivationRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().await.expect("Failed to create database");
        let paths = Arc::new(PluginDirectory::new(dir.path()));
        (SqliteActivationRegistry::new(db, paths), dir)
    }

    #[tokio::test]
    async fn test_activate_and_deactivate() {
        let (registry, dir) = registry().await;
        std::fs::create_dir(dir.path().join("seo")).unwrap();

        assert!(!registry.is_active("seo").await.unwrap());
        registry.activate("seo", false).await.unwrap();
        registry.activate("seo", true).await.unwrap();
        assert!(registry.is_active("seo").await.unwrap());
        assert_eq!(registry.active_plugins().await.unwrap(), vec!["seo".to_string()]);

        registry.deactivate("seo").await.unwrap();
        registry.deactivate("seo").await.unwrap();
        assert!(!registry.is_active("seo").await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_requires_installed_plugin() {
        let (registry, _dir) = registry().await;

        let err = registry.activate("ghost", false).await.unwrap_err();
        assert!(matches!(err, ActivationError::NotInstalled(_)));

        let err = registry.activate("../escape", false).await.unwrap_err();
        assert!(matches!(err, ActivationError::Refused(_)));
    }
}
