//! Plugbatch Core Library
//!
//! This crate provides the core functionality for plugbatch, including:
//! - Batch lifecycle processing (compatibility gating, backup, install, activation)
//! - Directory backups with digest-verified restore
//! - Batch manifests and whole-batch rollback
//! - Storage (SQLite) for manifests, activation state and the audit trail
//! - Queue building from unpacked packages or JSON queue files

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod queue;
pub mod report;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::backup::{BackupHandle, BackupStore, FsBackupStore};
    pub use crate::domain::lifecycle::{PluginLifecycleProcessor, ProcessorConfig};
    pub use crate::domain::plugin::{
        BatchReport, BatchSummary, ItemStatus, PluginAction, PluginDescriptor, ProcessingResult,
    };
    pub use crate::domain::rollback::{
        BatchRollbackCoordinator, ManifestEntry, RollbackReport, RollbackSettings,
    };
    pub use crate::error::{Error, Result};
}
