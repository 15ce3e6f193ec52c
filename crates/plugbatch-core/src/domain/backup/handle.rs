//! Backup handle entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque reference to a saved copy of a directory tree
///
/// Only the backup store that produced a handle knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHandle {
    path: PathBuf,
    digest: String,
    created_at: DateTime<Utc>,
}

impl BackupHandle {
    pub fn new(path: impl Into<PathBuf>, digest: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
            created_at,
        }
    }

    /// Where the saved tree lives
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-256 digest of the saved tree
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// When the backup was taken
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for BackupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
