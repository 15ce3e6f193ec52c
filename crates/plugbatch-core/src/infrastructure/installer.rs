//! Directory package installer
//!
//! A package is an unpacked plugin directory. Installing copies it to the
//! target; updating replaces the target's contents with the package's.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::domain::backup::copy_tree;
use crate::domain::lifecycle::{InstallError, PackageInstaller};
use crate::domain::plugin::PluginAction;

/// Installs unpacked package directories
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryPackageInstaller;

impl DirectoryPackageInstaller {
    pub fn new() -> Self {
        Self
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[async_trait]
impl PackageInstaller for DirectoryPackageInstaller {
    async fn install_or_upgrade(
        &self,
        action: PluginAction,
        package: &Path,
        target: &Path,
    ) -> Result<(), InstallError> {
        if !is_dir(package).await {
            return Err(InstallError::PackageMissing(package.to_path_buf()));
        }

        let target_exists = fs::symlink_metadata(target).await.is_ok();
        match action {
            PluginAction::Install if target_exists => {
                return Err(InstallError::TargetExists(target.to_path_buf()));
            }
            PluginAction::Update if !target_exists => {
                return Err(InstallError::TargetMissing(target.to_path_buf()));
            }
            PluginAction::Update => match fs::remove_dir_all(target).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
            PluginAction::Install => {}
        }

        let files = copy_tree(package, target).await?;
        debug!(
            package = %package.display(),
            target = %target.display(),
            files,
            "Copied package"
        );
        Ok(())
    }
}
