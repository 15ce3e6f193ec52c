//! Infrastructure layer
//!
//! Concrete collaborators backed by the filesystem and SQLite.

pub mod activation;
pub mod audit;
pub mod installer;
pub mod kv;
pub mod paths;

pub use activation::SqliteActivationRegistry;
pub use audit::SqliteAuditLog;
pub use installer::DirectoryPackageInstaller;
pub use kv::SqliteKvStore;
pub use paths::PluginDirectory;
