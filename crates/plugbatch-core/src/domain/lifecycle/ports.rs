//! Collaborator interfaces consumed by the lifecycle processor
//!
//! Installer and activation primitives return typed results; the processor
//! never inspects anything beyond success or the error's message.

use crate::domain::plugin::PluginAction;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Errors reported by a package installer
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Package not found at {}", .0.display())]
    PackageMissing(PathBuf),

    #[error("Target directory already exists: {}", .0.display())]
    TargetExists(PathBuf),

    #[error("Nothing installed at {}", .0.display())]
    TargetMissing(PathBuf),

    #[error("Package rejected: {0}")]
    Rejected(String),

    #[error("Installer I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the activation primitive
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("Plugin '{0}' is not installed")]
    NotInstalled(String),

    #[error("Activation refused: {0}")]
    Refused(String),

    #[error("Activation state unavailable: {0}")]
    Storage(String),
}

/// Installs or upgrades a package into a target directory
///
/// Opaque to the processor: every failure is treated the same way.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install_or_upgrade(
        &self,
        action: PluginAction,
        package: &Path,
        target: &Path,
    ) -> std::result::Result<(), InstallError>;
}

/// Reads and changes plugin activation state
#[async_trait]
pub trait ActivationController: Send + Sync {
    /// Whether the plugin is currently active
    async fn is_active(&self, slug: &str) -> std::result::Result<bool, ActivationError>;

    /// Activate the plugin, optionally for every site of a network
    async fn activate(
        &self,
        slug: &str,
        network_wide: bool,
    ) -> std::result::Result<(), ActivationError>;

    /// Deactivate the plugin; deactivating an inactive plugin is not an error
    async fn deactivate(&self, slug: &str) -> std::result::Result<(), ActivationError>;
}

/// Maps a plugin slug to its installation directory
///
/// The single place that knows the on-disk layout; shared by the processor,
/// the rollback coordinator and the compatibility checker.
pub trait PluginPaths: Send + Sync {
    fn plugin_dir(&self, slug: &str) -> Result<PathBuf>;
}
