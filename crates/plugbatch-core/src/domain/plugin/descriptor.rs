//! Plugin descriptor entity
//!
//! A descriptor is one queued plugin package: what it is, where its unpacked
//! files live, and what should happen to it.

use crate::domain::compatibility::CompatibilityIssue;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle action requested for a plugin package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginAction {
    /// Fresh installation; nothing exists yet at the target directory
    Install,
    /// Replace an existing installation with a newer package
    Update,
}

impl PluginAction {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "install" => Some(Self::Install),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for PluginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One plugin package queued for processing
///
/// Built by the queue layer and consumed read-only by the lifecycle
/// processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique key within a batch; also names the installation directory
    pub slug: String,

    /// Whether this is a fresh install or an update
    pub action: PluginAction,

    /// Location of the unpacked package
    pub package: PathBuf,

    /// Declared plugin name
    pub name: String,

    /// Declared version of the package being applied
    pub version: String,

    /// Version currently installed, `None` for new plugins
    #[serde(default)]
    pub installed_version: Option<String>,

    /// Per-item activation override; `None` defers to the global default
    #[serde(default)]
    pub activate: Option<bool>,

    /// Issues already found by the compatibility oracle
    #[serde(default)]
    pub compatibility_issues: Vec<CompatibilityIssue>,

    /// Minimum runtime version the package declares
    #[serde(default)]
    pub requires_runtime: Option<String>,

    /// Minimum host version the package declares
    #[serde(default)]
    pub requires_host: Option<String>,
}

impl PluginDescriptor {
    /// Describe a fresh install
    pub fn install(
        slug: impl Into<String>,
        package: impl Into<PathBuf>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        Self::new(PluginAction::Install, slug, package, name, version, None)
    }

    /// Describe an update of an installed plugin
    pub fn update(
        slug: impl Into<String>,
        package: impl Into<PathBuf>,
        name: impl Into<String>,
        version: impl Into<String>,
        installed_version: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            PluginAction::Update,
            slug,
            package,
            name,
            version,
            Some(installed_version.into()),
        )
    }

    fn new(
        action: PluginAction,
        slug: impl Into<String>,
        package: impl Into<PathBuf>,
        name: impl Into<String>,
        version: impl Into<String>,
        installed_version: Option<String>,
    ) -> Result<Self> {
        let descriptor = Self {
            slug: slug.into(),
            action,
            package: package.into(),
            name: name.into(),
            version: version.into(),
            installed_version: installed_version.filter(|v| !v.trim().is_empty()),
            activate: None,
            compatibility_issues: Vec::new(),
            requires_runtime: None,
            requires_host: None,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Set an explicit activation override
    pub fn with_activate(mut self, activate: Option<bool>) -> Self {
        self.activate = activate;
        self
    }

    /// Set minimum runtime and host versions
    pub fn with_requirements(
        mut self,
        requires_runtime: Option<String>,
        requires_host: Option<String>,
    ) -> Self {
        self.requires_runtime = requires_runtime;
        self.requires_host = requires_host;
        self
    }

    /// Attach issues found ahead of processing
    pub fn with_issues(mut self, issues: Vec<CompatibilityIssue>) -> Self {
        self.compatibility_issues = issues;
        self
    }

    /// Check invariants that deserialized descriptors may not satisfy
    pub fn validate(&self) -> Result<()> {
        validate_slug(&self.slug)?;
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Plugin '{}' has an empty name",
                self.slug
            )));
        }
        if self.version.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Plugin '{}' has an empty version",
                self.slug
            )));
        }
        Ok(())
    }

    /// Whether the package is a fresh install
    pub fn is_install(&self) -> bool {
        self.action == PluginAction::Install
    }
}

/// Reject slugs that cannot safely name a directory
pub fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty()
        && slug != "."
        && slug != ".."
        && slug.len() <= 200
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSlug(slug.to_string()))
    }
}
