//! Backup domain module
//!
//! Reversible protection around plugin directory mutations.
//!
//! # Architecture
//!
//! - **Handle**: `BackupHandle`, the opaque reference to one saved tree
//! - **Store**: `BackupStore` trait (create / restore / discard / remove)
//! - **Filesystem**: `FsBackupStore`, copies trees into a backup area and
//!   verifies restores against a SHA-256 tree digest
//!
//! A handle is created immediately before a destructive update and consumed
//! exactly once, by a restore or by a cleanup.

pub mod fs;
pub mod handle;
pub mod store;
pub mod tree;

pub use fs::FsBackupStore;
pub use handle::BackupHandle;
pub use store::{BackupError, BackupStore};
pub use tree::{copy_tree, tree_digest};
