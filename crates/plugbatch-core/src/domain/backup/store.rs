//! Backup store trait
//!
//! Abstracts over where and how directory snapshots are kept.

use super::handle::BackupHandle;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Errors produced by a backup store
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup source does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Backup storage is gone: {}", .0.display())]
    HandleMissing(PathBuf),

    #[error("Failed to copy into {}: {source}", .path.display())]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Restored tree at {} does not match the backup digest", .0.display())]
    DigestMismatch(PathBuf),
}

/// Point-in-time copies of plugin directories
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Copy `directory` into the backup area
    ///
    /// A failure means there is no usable backup; partial copies are not
    /// guaranteed to be cleaned up.
    async fn create_backup(&self, directory: &Path) -> Result<BackupHandle, BackupError>;

    /// Replace the contents of `target` with the saved tree
    ///
    /// The backup's own storage is left in place.
    async fn restore_backup(&self, handle: &BackupHandle, target: &Path)
    -> Result<(), BackupError>;

    /// Delete a directory tree outright; an absent directory counts as removed
    async fn remove_partial_install(&self, directory: &Path) -> Result<(), BackupError>;

    /// Discard the backup storage once nothing needs it
    async fn cleanup_backup(&self, handle: &BackupHandle);

    /// Delete backups older than `max_age`, returning how many were removed
    async fn prune_older_than(&self, _max_age: chrono::Duration) -> Result<usize, BackupError> {
        Ok(0)
    }
}
