//! Compatibility gating
//!
//! The lifecycle processor treats any non-empty issue list as an instant
//! `incompatible` verdict. Issues either arrive pre-attached to a descriptor
//! or come from a [`CompatibilityOracle`].

use crate::domain::lifecycle::PluginPaths;
use crate::domain::plugin::{PluginAction, PluginDescriptor};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Category of compatibility problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Package needs a newer runtime than the host provides
    RuntimeVersion,
    /// Package needs a newer host platform
    HostVersion,
    /// Slug collides with (or is missing from) the installed plugins
    SlugConflict,
    /// Anything else reported by an external checker
    Other,
}

/// A single compatibility problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl CompatibilityIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompatibilityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Pre-check oracle consulted before any item is touched
pub trait CompatibilityOracle: Send + Sync {
    /// Return every issue found for the descriptor; empty means compatible
    fn check(&self, descriptor: &PluginDescriptor) -> Vec<CompatibilityIssue>;
}

/// Versions of the environment packages are installed into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEnvironment {
    pub runtime_version: String,
    pub host_version: String,
}

/// Checks declared minimum versions and slug conflicts against the host
pub struct HostCompatibilityChecker {
    environment: HostEnvironment,
    paths: Arc<dyn PluginPaths>,
}

impl HostCompatibilityChecker {
    pub fn new(environment: HostEnvironment, paths: Arc<dyn PluginPaths>) -> Self {
        Self { environment, paths }
    }

    fn check_minimum(
        kind: IssueKind,
        label: &str,
        required: Option<&str>,
        available: &str,
    ) -> Option<CompatibilityIssue> {
        let required = required.map(str::trim).filter(|r| !r.is_empty())?;

        let (Some(req), Some(have)) = (parse_lenient(required), parse_lenient(available)) else {
            return Some(CompatibilityIssue::new(
                kind,
                format!(
                    "Cannot compare {} requirement '{}' with installed '{}'",
                    label, required, available
                ),
            ));
        };

        if have < req {
            Some(CompatibilityIssue::new(
                kind,
                format!(
                    "Requires {} {} or newer (installed: {})",
                    label, required, available
                ),
            ))
        } else {
            None
        }
    }

    fn check_slug(&self, descriptor: &PluginDescriptor) -> Option<CompatibilityIssue> {
        let Ok(directory) = self.paths.plugin_dir(&descriptor.slug) else {
            return Some(CompatibilityIssue::new(
                IssueKind::SlugConflict,
                format!("Slug '{}' cannot be mapped to a plugin directory", descriptor.slug),
            ));
        };

        match (descriptor.action, directory.exists()) {
            (PluginAction::Install, true) => Some(CompatibilityIssue::new(
                IssueKind::SlugConflict,
                format!(
                    "A plugin named '{}' is already installed; queue it as an update instead",
                    descriptor.slug
                ),
            )),
            (PluginAction::Update, false) => Some(CompatibilityIssue::new(
                IssueKind::SlugConflict,
                format!("No installed plugin '{}' to update", descriptor.slug),
            )),
            _ => None,
        }
    }
}

impl CompatibilityOracle for HostCompatibilityChecker {
    fn check(&self, descriptor: &PluginDescriptor) -> Vec<CompatibilityIssue> {
        let mut issues = Vec::new();

        issues.extend(Self::check_minimum(
            IssueKind::RuntimeVersion,
            "runtime",
            descriptor.requires_runtime.as_deref(),
            &self.environment.runtime_version,
        ));
        issues.extend(Self::check_minimum(
            IssueKind::HostVersion,
            "host",
            descriptor.requires_host.as_deref(),
            &self.environment.host_version,
        ));
        issues.extend(self.check_slug(descriptor));

        issues
    }
}

/// Parse `X`, `X.Y` or `X.Y.Z` (with optional pre-release) as a semver version
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches(['v', 'V']);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let (core, suffix) = match raw.split_once('-') {
        Some((core, suffix)) => (core, Some(suffix)),
        None => (raw, None),
    };

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    let padded = match suffix {
        Some(suffix) => format!("{}-{}", parts.join("."), suffix),
        None => parts.join("."),
    };
    Version::parse(&padded).ok()
}
