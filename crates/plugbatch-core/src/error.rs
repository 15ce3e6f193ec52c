//! Error types for plugbatch

use thiserror::Error;

use crate::domain::backup::BackupError;
use crate::domain::lifecycle::{ActivationError, InstallError};

/// Result type alias using plugbatch's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Plugbatch error types with helpful messages and suggestions
///
/// Per-item failures inside a batch never surface as this type; they are
/// folded into the item's result. This covers everything around the batch:
/// configuration, storage, queue loading and manifest lookups.
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Batch '{0}' not found or expired. Run `plugbatch rollback list` to see active batches.")]
    BatchNotFound(String),

    #[error("Plugin '{0}' not found.")]
    PluginNotFound(String),

    #[error("Invalid plugin slug '{0}'. Slugs may contain letters, digits, '-', '_' and '.'.")]
    InvalidSlug(String),

    // Lifecycle errors (E100-E199)
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid queue: {0}")]
    QueueInvalid(String),

    // Serialization errors (E900-E999)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::BatchNotFound(_) => "E001",
            Self::PluginNotFound(_) => "E002",
            Self::InvalidSlug(_) => "E003",
            Self::Backup(_) => "E100",
            Self::Install(_) => "E101",
            Self::Activation(_) => "E102",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::QueueInvalid(_) => "E801",
            Self::Serialization(_) => "E900",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::BatchNotFound(_) => Some("plugbatch rollback list".to_string()),
            Self::ConfigError(_) => Some("plugbatch config list".to_string()),
            Self::QueueInvalid(_) => {
                Some("Check that every queue entry has a unique, valid slug".to_string())
            }
            _ => None,
        }
    }
}
