//! Filesystem backup store
//!
//! Keeps each backup as a plain directory copy under a dedicated backup
//! root, named after the source directory plus a timestamp.

use super::handle::BackupHandle;
use super::store::{BackupError, BackupStore};
use super::tree::{copy_tree, tree_digest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Backup store writing directory copies to disk
#[derive(Debug, Clone)]
pub struct FsBackupStore {
    root: PathBuf,
}

impl FsBackupStore {
    /// Create a store rooted at the given backup directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The backup root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn backup_path_for(&self, directory: &Path) -> PathBuf {
        let name = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plugin".to_string());
        let suffix = Uuid::new_v4().simple().to_string();

        self.root.join(format!(
            "{}-{}-{}",
            name,
            Utc::now().format("%Y%m%d%H%M%S"),
            &suffix[..8]
        ))
    }

    /// List backup directories currently held, oldest name first
    pub async fn list_backups(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut backups = Vec::new();

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(backups),
            Err(source) => {
                return Err(BackupError::Copy {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        while let Some(entry) = dir.next_entry().await.map_err(|source| BackupError::Copy {
            path: self.root.clone(),
            source,
        })? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                backups.push(entry.path());
            }
        }

        backups.sort();
        Ok(backups)
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn remove_tree(path: &Path) -> Result<(), BackupError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BackupError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[async_trait]
impl BackupStore for FsBackupStore {
    async fn create_backup(&self, directory: &Path) -> Result<BackupHandle, BackupError> {
        if !is_dir(directory).await {
            return Err(BackupError::SourceMissing(directory.to_path_buf()));
        }

        let destination = self.backup_path_for(directory);
        let files = copy_tree(directory, &destination)
            .await
            .map_err(|source| BackupError::Copy {
                path: destination.clone(),
                source,
            })?;
        let digest = tree_digest(&destination)
            .await
            .map_err(|source| BackupError::Copy {
                path: destination.clone(),
                source,
            })?;

        info!(
            source = %directory.display(),
            backup = %destination.display(),
            files,
            "Backup created"
        );

        Ok(BackupHandle::new(destination, digest, Utc::now()))
    }

    async fn restore_backup(
        &self,
        handle: &BackupHandle,
        target: &Path,
    ) -> Result<(), BackupError> {
        if !is_dir(handle.path()).await {
            return Err(BackupError::HandleMissing(handle.path().to_path_buf()));
        }

        remove_tree(target).await?;
        copy_tree(handle.path(), target)
            .await
            .map_err(|source| BackupError::Copy {
                path: target.to_path_buf(),
                source,
            })?;

        let restored = tree_digest(target)
            .await
            .map_err(|source| BackupError::Copy {
                path: target.to_path_buf(),
                source,
            })?;
        if restored != handle.digest() {
            return Err(BackupError::DigestMismatch(target.to_path_buf()));
        }

        info!(
            backup = %handle,
            target = %target.display(),
            "Backup restored"
        );
        Ok(())
    }

    async fn remove_partial_install(&self, directory: &Path) -> Result<(), BackupError> {
        remove_tree(directory).await?;
        debug!(directory = %directory.display(), "Directory removed");
        Ok(())
    }

    async fn cleanup_backup(&self, handle: &BackupHandle) {
        match remove_tree(handle.path()).await {
            Ok(()) => debug!(backup = %handle, "Backup discarded"),
            Err(e) => warn!(backup = %handle, error = %e, "Failed to discard backup"),
        }
    }

    async fn prune_older_than(&self, max_age: chrono::Duration) -> Result<usize, BackupError> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;

        for backup in self.list_backups().await? {
            let modified = match fs::metadata(&backup).await.and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    warn!(backup = %backup.display(), error = %e, "Cannot read backup age");
                    continue;
                }
            };

            if modified < cutoff {
                remove_tree(&backup).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Pruned expired backups");
        }
        Ok(removed)
    }
}
