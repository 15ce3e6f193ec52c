//! Per-item lifecycle state machine
//!
//! `pending -> installing -> {success, failed}`, with `incompatible`
//! reachable only from `pending`. Dry runs go straight from `pending` to
//! `success`. Terminal states accept no further transitions.

use crate::domain::backup::BackupHandle;
use crate::domain::compatibility::CompatibilityIssue;
use crate::domain::plugin::{ItemStatus, PluginDescriptor, ProcessingResult};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    Installing,
    Success,
    Failed,
    Incompatible,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Installing => "installing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Incompatible => "incompatible",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Incompatible)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks one descriptor through processing and builds its result
#[derive(Debug)]
pub struct ItemLifecycle<'a> {
    descriptor: &'a PluginDescriptor,
    state: LifecycleState,
    dry_run: bool,
    activated: bool,
    messages: Vec<String>,
    issues: Vec<CompatibilityIssue>,
    backup: Option<BackupHandle>,
}

impl<'a> ItemLifecycle<'a> {
    pub fn new(descriptor: &'a PluginDescriptor, dry_run: bool) -> Self {
        Self {
            descriptor,
            state: LifecycleState::Pending,
            dry_run,
            activated: false,
            messages: Vec::new(),
            issues: Vec::new(),
            backup: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Append a notice without changing state
    pub fn note(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    fn transition(&mut self, allowed_from: &[LifecycleState], to: LifecycleState) -> bool {
        if !allowed_from.contains(&self.state) {
            warn!(
                slug = %self.descriptor.slug,
                from = %self.state,
                to = %to,
                "Ignoring invalid lifecycle transition"
            );
            return false;
        }

        debug!(
            slug = %self.descriptor.slug,
            from = %self.state,
            to = %to,
            "Lifecycle transition"
        );
        self.state = to;
        true
    }

    /// Compatibility gating passed; destructive work is about to start
    pub fn begin_install(&mut self) {
        self.transition(&[LifecycleState::Pending], LifecycleState::Installing);
    }

    /// Gating found issues; nothing will be attempted
    pub fn mark_incompatible(&mut self, issues: Vec<CompatibilityIssue>) {
        if self.transition(&[LifecycleState::Pending], LifecycleState::Incompatible) {
            let summary = issues
                .iter()
                .map(|i| i.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            self.messages.push(format!("Incompatible: {}", summary));
            self.issues = issues;
        }
    }

    /// The item took effect (or, in a dry run, would have)
    pub fn succeed(&mut self, activated: bool) {
        if self.transition(
            &[LifecycleState::Pending, LifecycleState::Installing],
            LifecycleState::Success,
        ) {
            self.activated = activated;
        }
    }

    /// The item failed; `message` explains why
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.transition(
            &[LifecycleState::Pending, LifecycleState::Installing],
            LifecycleState::Failed,
        ) {
            self.messages.push(message);
        }
    }

    /// Hand a backup over to the result instead of discarding it
    pub fn retain_backup(&mut self, handle: BackupHandle) {
        self.backup = Some(handle);
    }

    /// Build the immutable result
    pub fn finish(mut self) -> ProcessingResult {
        let status = match self.state {
            LifecycleState::Success => ItemStatus::Success,
            LifecycleState::Incompatible => ItemStatus::Incompatible,
            LifecycleState::Failed => ItemStatus::Failed,
            LifecycleState::Pending | LifecycleState::Installing => {
                self.messages
                    .push(format!("Processing stopped while {}", self.state));
                ItemStatus::Failed
            }
        };

        if self.messages.is_empty() {
            self.messages.push(format!("Finished with status {}", status));
        }

        ProcessingResult {
            slug: self.descriptor.slug.clone(),
            action: self.descriptor.action,
            status,
            activated: status == ItemStatus::Success && self.activated,
            messages: self.messages,
            compatibility_issues: self.issues,
            is_dry_run: self.dry_run,
            previous_version: self.descriptor.installed_version.clone(),
            new_version: self.descriptor.version.clone(),
            backup: self.backup,
        }
    }
}
