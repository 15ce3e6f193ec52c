//! Queue building
//!
//! Turns unpacked package directories (or a JSON queue file) into the
//! ordered descriptor list the processor consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::lifecycle::PluginPaths;
use crate::domain::plugin::{PluginDescriptor, validate_slug};
use crate::{Error, Result};

/// File inside every package describing it
pub const PACKAGE_MANIFEST_FILE: &str = "plugin.json";

const MAX_MANIFEST_BYTES: u64 = 64 * 1024;
const MAX_QUEUE_BYTES: u64 = 4 * 1024 * 1024;

/// Contents of a package's `plugin.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub slug: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub requires_runtime: Option<String>,
    #[serde(default)]
    pub requires_host: Option<String>,
}

fn read_capped(path: &Path, cap: u64, what: &str) -> Result<String> {
    let metadata = fs::metadata(path)?;
    if metadata.len() > cap {
        return Err(Error::QueueInvalid(format!(
            "{} too large: {} ({} bytes, limit {})",
            what,
            path.display(),
            metadata.len(),
            cap
        )));
    }
    Ok(fs::read_to_string(path)?)
}

/// Read and validate `plugin.json` from a package directory
pub fn load_package_manifest(dir: &Path) -> Result<PackageManifest> {
    let path = dir.join(PACKAGE_MANIFEST_FILE);
    if !path.is_file() {
        return Err(Error::QueueInvalid(format!(
            "No {} in {}",
            PACKAGE_MANIFEST_FILE,
            dir.display()
        )));
    }

    let data = read_capped(&path, MAX_MANIFEST_BYTES, "Package manifest")?;
    let manifest: PackageManifest = serde_json::from_str(&data).map_err(|e| {
        Error::QueueInvalid(format!("Invalid manifest JSON in {}: {}", path.display(), e))
    })?;

    validate_slug(&manifest.slug)?;
    if manifest.name.trim().is_empty() || manifest.version.trim().is_empty() {
        return Err(Error::QueueInvalid(format!(
            "Manifest {} must declare a name and a version",
            path.display()
        )));
    }

    Ok(manifest)
}

/// Build descriptors for package directories, in argument order
///
/// A package whose slug is already installed becomes an update, with the
/// installed version read from the installed copy's manifest.
pub fn build_queue(
    packages: &[PathBuf],
    paths: &dyn PluginPaths,
    activate: Option<bool>,
) -> Result<Vec<PluginDescriptor>> {
    let mut seen = HashSet::new();
    let mut queue = Vec::with_capacity(packages.len());

    for package in packages {
        let package = package.as_path();
        let manifest = load_package_manifest(package)?;
        if !seen.insert(manifest.slug.clone()) {
            return Err(Error::QueueInvalid(format!(
                "Plugin '{}' appears more than once in the batch",
                manifest.slug
            )));
        }

        let installed_dir = paths.plugin_dir(&manifest.slug)?;
        let descriptor = if installed_dir.is_dir() {
            let installed_version = load_package_manifest(&installed_dir)
                .map(|m| m.version)
                .unwrap_or_default();
            PluginDescriptor::update(
                &manifest.slug,
                package,
                &manifest.name,
                &manifest.version,
                installed_version,
            )?
        } else {
            PluginDescriptor::install(&manifest.slug, package, &manifest.name, &manifest.version)?
        };

        tracing::debug!(
            slug = %descriptor.slug,
            action = %descriptor.action,
            package = %package.display(),
            "Queued package"
        );
        queue.push(
            descriptor
                .with_activate(activate)
                .with_requirements(manifest.requires_runtime, manifest.requires_host),
        );
    }

    Ok(queue)
}

/// Load a JSON array of descriptors
pub fn load_queue_file(path: &Path) -> Result<Vec<PluginDescriptor>> {
    let data = read_capped(path, MAX_QUEUE_BYTES, "Queue file")?;
    let queue: Vec<PluginDescriptor> = serde_json::from_str(&data)
        .map_err(|e| Error::QueueInvalid(format!("Invalid queue JSON in {}: {}", path.display(), e)))?;

    let mut seen = HashSet::new();
    for descriptor in &queue {
        descriptor.validate()?;
        if !seen.insert(descriptor.slug.as_str()) {
            return Err(Error::QueueInvalid(format!(
                "Plugin '{}' appears more than once in the batch",
                descriptor.slug
            )));
        }
    }

    Ok(queue)
}
