//! Batch rollback
//!
//! Manifests of completed batches, the TTL store that holds them, and the
//! coordinator that reverts a batch on request.

pub mod coordinator;
pub mod manifest;
pub mod store;

pub use coordinator::{
    BatchRollbackCoordinator, DEFAULT_RETENTION_HOURS, MANIFEST_KEY_PREFIX, MAX_RETENTION_HOURS,
    RollbackEntryError, RollbackEntryResult, RollbackEntryStatus, RollbackReport,
    RollbackSettings,
};
pub use manifest::{BatchManifest, ManifestEntry};
pub use store::{KeyValueStore, MemoryKvStore};
