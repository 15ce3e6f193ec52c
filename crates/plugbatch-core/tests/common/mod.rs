//! Shared fakes for plugbatch-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use plugbatch_core::domain::backup::{BackupError, BackupHandle, BackupStore};
use plugbatch_core::domain::lifecycle::{
    ActivationController, ActivationError, InstallError, PackageInstaller, PluginLifecycleProcessor,
    ProcessorConfig,
};
use plugbatch_core::domain::plugin::{PluginAction, PluginDescriptor};
use plugbatch_core::infrastructure::PluginDirectory;

pub const PLUGINS_ROOT: &str = "/plugins";

fn slug_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn set_of(slugs: &[&str]) -> HashSet<String> {
    slugs.iter().map(|s| s.to_string()).collect()
}

/// Installer that fails for the configured slugs
#[derive(Default)]
pub struct FakeInstaller {
    fail: HashSet<String>,
    calls: Mutex<Vec<(PluginAction, String)>>,
}

impl FakeInstaller {
    pub fn failing(slugs: &[&str]) -> Self {
        Self {
            fail: set_of(slugs),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(PluginAction, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageInstaller for FakeInstaller {
    async fn install_or_upgrade(
        &self,
        action: PluginAction,
        _package: &Path,
        target: &Path,
    ) -> Result<(), InstallError> {
        let slug = slug_of(target);
        self.calls.lock().unwrap().push((action, slug.clone()));
        if self.fail.contains(&slug) {
            return Err(InstallError::Rejected(format!("{} package is corrupt", slug)));
        }
        Ok(())
    }
}

/// Activation primitive with scripted state and failures
#[derive(Default)]
pub struct FakeActivation {
    active: Mutex<HashSet<String>>,
    fail_activate: HashSet<String>,
    fail_query: bool,
    activate_calls: Mutex<Vec<(String, bool)>>,
    deactivate_calls: Mutex<Vec<String>>,
}

impl FakeActivation {
    pub fn with_active(slugs: &[&str]) -> Self {
        Self {
            active: Mutex::new(set_of(slugs)),
            ..Default::default()
        }
    }

    pub fn failing_activation(mut self, slugs: &[&str]) -> Self {
        self.fail_activate = set_of(slugs);
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.fail_query = true;
        self
    }

    pub fn activate_calls(&self) -> Vec<(String, bool)> {
        self.activate_calls.lock().unwrap().clone()
    }

    pub fn deactivate_calls(&self) -> Vec<String> {
        self.deactivate_calls.lock().unwrap().clone()
    }

    pub fn is_marked_active(&self, slug: &str) -> bool {
        self.active.lock().unwrap().contains(slug)
    }
}

#[async_trait]
impl ActivationController for FakeActivation {
    async fn is_active(&self, slug: &str) -> Result<bool, ActivationError> {
        if self.fail_query {
            return Err(ActivationError::Storage("registry offline".to_string()));
        }
        Ok(self.active.lock().unwrap().contains(slug))
    }

    async fn activate(&self, slug: &str, network_wide: bool) -> Result<(), ActivationError> {
        self.activate_calls
            .lock()
            .unwrap()
            .push((slug.to_string(), network_wide));
        if self.fail_activate.contains(slug) {
            return Err(ActivationError::Refused("fatal error during activation".to_string()));
        }
        self.active.lock().unwrap().insert(slug.to_string());
        Ok(())
    }

    async fn deactivate(&self, slug: &str) -> Result<(), ActivationError> {
        self.deactivate_calls.lock().unwrap().push(slug.to_string());
        self.active.lock().unwrap().remove(slug);
        Ok(())
    }
}

/// Backup store that records every call
#[derive(Default)]
pub struct FakeBackupStore {
    fail_create: HashSet<String>,
    fail_restore: HashSet<String>,
    fail_remove: HashSet<String>,
    created: Mutex<Vec<String>>,
    restored: Mutex<Vec<(PathBuf, PathBuf)>>,
    removed: Mutex<Vec<PathBuf>>,
    cleaned: Mutex<Vec<PathBuf>>,
}

impl FakeBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(mut self, slugs: &[&str]) -> Self {
        self.fail_create = set_of(slugs);
        self
    }

    pub fn failing_restore(mut self, slugs: &[&str]) -> Self {
        self.fail_restore = set_of(slugs);
        self
    }

    pub fn failing_remove(mut self, slugs: &[&str]) -> Self {
        self.fail_remove = set_of(slugs);
        self
    }

    /// Handle the store hands out for a slug's directory
    pub fn handle_path(slug: &str) -> PathBuf {
        PathBuf::from("/backups").join(slug)
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// (backup path, target directory) pairs
    pub fn restored(&self) -> Vec<(PathBuf, PathBuf)> {
        self.restored.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }

    pub fn cleaned(&self) -> Vec<PathBuf> {
        self.cleaned.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupStore for FakeBackupStore {
    async fn create_backup(&self, directory: &Path) -> Result<BackupHandle, BackupError> {
        let slug = slug_of(directory);
        if self.fail_create.contains(&slug) {
            return Err(BackupError::SourceMissing(directory.to_path_buf()));
        }
        self.created.lock().unwrap().push(slug.clone());
        Ok(BackupHandle::new(Self::handle_path(&slug), "digest", Utc::now()))
    }

    async fn restore_backup(&self, handle: &BackupHandle, target: &Path) -> Result<(), BackupError> {
        self.restored
            .lock()
            .unwrap()
            .push((handle.path().to_path_buf(), target.to_path_buf()));
        if self.fail_restore.contains(&slug_of(target)) {
            return Err(BackupError::DigestMismatch(target.to_path_buf()));
        }
        Ok(())
    }

    async fn remove_partial_install(&self, directory: &Path) -> Result<(), BackupError> {
        self.removed.lock().unwrap().push(directory.to_path_buf());
        if self.fail_remove.contains(&slug_of(directory)) {
            return Err(BackupError::Remove {
                path: directory.to_path_buf(),
                source: std::io::Error::other("device busy"),
            });
        }
        Ok(())
    }

    async fn cleanup_backup(&self, handle: &BackupHandle) {
        self.cleaned.lock().unwrap().push(handle.path().to_path_buf());
    }
}

/// Processor wired to the given fakes
pub struct Harness {
    pub installer: Arc<FakeInstaller>,
    pub activation: Arc<FakeActivation>,
    pub backups: Arc<FakeBackupStore>,
    pub paths: Arc<PluginDirectory>,
}

impl Harness {
    pub fn new(installer: FakeInstaller, activation: FakeActivation, backups: FakeBackupStore) -> Self {
        Self {
            installer: Arc::new(installer),
            activation: Arc::new(activation),
            backups: Arc::new(backups),
            paths: Arc::new(PluginDirectory::new(PLUGINS_ROOT)),
        }
    }

    /// Resolve plugin directories under a real root instead of `/plugins`
    pub fn with_plugins_root(mut self, root: &Path) -> Self {
        self.paths = Arc::new(PluginDirectory::new(root));
        self
    }

    pub fn processor(&self, config: ProcessorConfig) -> PluginLifecycleProcessor {
        PluginLifecycleProcessor::new(
            config,
            self.installer.clone(),
            self.activation.clone(),
            self.backups.clone(),
            self.paths.clone(),
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(
            FakeInstaller::default(),
            FakeActivation::default(),
            FakeBackupStore::new(),
        )
    }
}

pub fn target(slug: &str) -> PathBuf {
    PathBuf::from(PLUGINS_ROOT).join(slug)
}

pub fn install(slug: &str) -> PluginDescriptor {
    PluginDescriptor::install(slug, format!("/uploads/{}", slug), format!("{} plugin", slug), "1.0.0")
        .expect("valid descriptor")
}

pub fn update(slug: &str) -> PluginDescriptor {
    PluginDescriptor::update(
        slug,
        format!("/uploads/{}", slug),
        format!("{} plugin", slug),
        "2.0.0",
        "1.0.0",
    )
    .expect("valid descriptor")
}
