//! Batch plugin lifecycle processor
//!
//! Drives each queued descriptor through compatibility gating,
//! backup-before-update, installation and activation reconciliation.
//! Items are processed strictly one after another, in input order, and no
//! failure of one item ever stops the batch.

use super::activation::ActivationPlan;
use super::ports::{ActivationController, PackageInstaller, PluginPaths};
use super::state::ItemLifecycle;
use crate::domain::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::domain::backup::{BackupHandle, BackupStore};
use crate::domain::compatibility::{CompatibilityIssue, CompatibilityOracle, IssueKind};
use crate::domain::plugin::{
    BatchReport, BatchSummary, PluginAction, PluginDescriptor, ProcessingResult,
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default actor recorded in the audit trail
pub const DEFAULT_ACTOR: &str = "system";

/// Settings the processor reads at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Activate plugins after install/update unless an item overrides it
    pub auto_activate: bool,

    /// Restore the backup when an update's installer fails
    pub auto_rollback: bool,

    /// Keep successful updates' backups and hand them to the result,
    /// so a later batch rollback can restore them
    pub retain_backups: bool,

    /// Activate across the whole network rather than a single site
    pub network_wide: bool,

    /// Who is running the batch, for the audit trail
    pub actor_id: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            auto_activate: false,
            auto_rollback: true,
            retain_backups: false,
            network_wide: false,
            actor_id: DEFAULT_ACTOR.to_string(),
        }
    }
}

/// Sequential processor for a queue of plugin descriptors
pub struct PluginLifecycleProcessor {
    config: ProcessorConfig,
    installer: Arc<dyn PackageInstaller>,
    activation: Arc<dyn ActivationController>,
    backups: Arc<dyn BackupStore>,
    paths: Arc<dyn PluginPaths>,
    oracle: Option<Arc<dyn CompatibilityOracle>>,
    audit: Arc<dyn AuditSink>,
}

impl PluginLifecycleProcessor {
    /// Create a processor with the given collaborators
    ///
    /// Audit records go to the tracing log until a sink is configured, and
    /// only pre-attached compatibility issues are honoured until an oracle
    /// is configured.
    pub fn new(
        config: ProcessorConfig,
        installer: Arc<dyn PackageInstaller>,
        activation: Arc<dyn ActivationController>,
        backups: Arc<dyn BackupStore>,
        paths: Arc<dyn PluginPaths>,
    ) -> Self {
        Self {
            config,
            installer,
            activation,
            backups,
            paths,
            oracle: None,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Consult a compatibility oracle for every item
    pub fn with_oracle(mut self, oracle: Arc<dyn CompatibilityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Send audit records to the given sink
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Get the processor configuration
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process every descriptor, in order, and summarize the batch
    ///
    /// Always returns one result per descriptor. In a dry run nothing is
    /// backed up, installed or activated.
    pub async fn process_batch(
        &self,
        descriptors: &[PluginDescriptor],
        dry_run: bool,
    ) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            batch_id = %batch_id,
            items = descriptors.len(),
            dry_run,
            "Processing plugin batch"
        );

        let mut results = Vec::with_capacity(descriptors.len());
        let mut summary = BatchSummary::default();

        for descriptor in descriptors {
            let result = self.process_item(descriptor, dry_run).await;
            summary.record(&result);
            self.audit(batch_id, &result).await;
            results.push(result);
        }

        debug_assert!(summary.is_consistent());
        info!(
            batch_id = %batch_id,
            total = summary.total,
            installed = summary.installed,
            updated = summary.updated,
            failed = summary.failed,
            incompatible = summary.incompatible,
            "Plugin batch complete"
        );

        BatchReport {
            batch_id,
            dry_run,
            started_at,
            finished_at: Utc::now(),
            results,
            summary,
        }
    }

    /// Run one descriptor to a terminal state
    async fn process_item(&self, descriptor: &PluginDescriptor, dry_run: bool) -> ProcessingResult {
        let mut item = ItemLifecycle::new(descriptor, dry_run);
        let slug = descriptor.slug.as_str();

        let target = match self.paths.plugin_dir(slug) {
            Ok(target) => target,
            Err(e) => {
                item.mark_incompatible(vec![CompatibilityIssue::new(
                    IssueKind::SlugConflict,
                    e.to_string(),
                )]);
                return item.finish();
            }
        };

        let issues = self.compatibility_issues(descriptor);
        if !issues.is_empty() {
            info!(slug, issues = issues.len(), "Plugin is incompatible, skipping");
            item.mark_incompatible(issues);
            return item.finish();
        }

        // Sampled once, before anything destructive happens
        let already_active = match descriptor.action {
            PluginAction::Update => match self.activation.is_active(slug).await {
                Ok(active) => active,
                Err(e) => {
                    warn!(slug, error = %e, "Could not read activation state");
                    item.note(format!("Could not determine activation state: {}", e));
                    false
                }
            },
            PluginAction::Install => false,
        };
        let plan = ActivationPlan::resolve(
            descriptor.activate,
            self.config.auto_activate,
            descriptor.action,
            already_active,
        );

        if dry_run {
            let verb = match descriptor.action {
                PluginAction::Install => "installed",
                PluginAction::Update => "updated",
            };
            item.note(format!(
                "Dry run: {} {} would be {}; no changes were made.",
                descriptor.name, descriptor.version, verb
            ));
            if plan.expected_activated() {
                item.note("Dry run: the plugin would be active afterwards.");
            }
            item.succeed(plan.expected_activated());
            return item.finish();
        }

        item.begin_install();

        let backup = match descriptor.action {
            PluginAction::Update => match self.backups.create_backup(&target).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(slug, error = %e, "Backup failed, update not attempted");
                    item.fail(format!("Backup failed, update was not attempted: {}", e));
                    return item.finish();
                }
            },
            PluginAction::Install => None,
        };
        // Only a directory this install creates may be removed on failure
        let target_preexisting = match descriptor.action {
            PluginAction::Install => tokio::fs::symlink_metadata(&target).await.is_ok(),
            PluginAction::Update => true,
        };

        if let Err(e) = self
            .installer
            .install_or_upgrade(descriptor.action, &descriptor.package, &target)
            .await
        {
            warn!(slug, action = %descriptor.action, error = %e, "Installer failed");
            item.fail(format!(
                "{} failed: {}",
                capitalize(descriptor.action.as_str()),
                e
            ));
            match backup {
                Some(handle) => self.recover_update(&mut item, handle, &target).await,
                None => {
                    self.recover_install(&mut item, &target, target_preexisting)
                        .await
                }
            }
            return item.finish();
        }

        match descriptor.action {
            PluginAction::Install => {
                item.note(format!("Installed {} {}", descriptor.name, descriptor.version));
            }
            PluginAction::Update => {
                item.note(format!(
                    "Updated {} from {} to {}",
                    descriptor.name,
                    descriptor.installed_version.as_deref().unwrap_or("unknown"),
                    descriptor.version
                ));
            }
        }

        if let Some(handle) = backup {
            if self.config.retain_backups {
                debug!(slug, backup = %handle, "Retaining backup for batch rollback");
                item.retain_backup(handle);
            } else {
                self.backups.cleanup_backup(&handle).await;
            }
        }

        let activated = self.reconcile_activation(&mut item, slug, plan).await;
        item.succeed(activated);

        info!(slug, action = %descriptor.action, activated, "Plugin processed");
        item.finish()
    }

    fn compatibility_issues(&self, descriptor: &PluginDescriptor) -> Vec<CompatibilityIssue> {
        if !descriptor.compatibility_issues.is_empty() {
            return descriptor.compatibility_issues.clone();
        }

        self.oracle
            .as_ref()
            .map(|oracle| oracle.check(descriptor))
            .unwrap_or_default()
    }

    /// Undo a failed update from the backup taken just before it
    async fn recover_update(&self, item: &mut ItemLifecycle<'_>, handle: BackupHandle, target: &Path) {
        if !self.config.auto_rollback {
            item.note(format!(
                "Automatic rollback is disabled; backup kept at {}",
                handle
            ));
            item.retain_backup(handle);
            return;
        }

        match self.backups.restore_backup(&handle, target).await {
            Ok(()) => item.note("Previous version restored from backup"),
            Err(e) => {
                warn!(backup = %handle, error = %e, "Restore after failed update failed");
                item.note(format!(
                    "Restoring the previous version failed: {}; backup kept at {}",
                    e, handle
                ));
                item.retain_backup(handle);
            }
        }
    }

    /// Remove whatever a failed fresh install left behind
    ///
    /// A target that was already on disk before the install is left alone.
    async fn recover_install(
        &self,
        item: &mut ItemLifecycle<'_>,
        target: &Path,
        target_preexisting: bool,
    ) {
        if target_preexisting {
            warn!(
                target = %target.display(),
                "Install target existed before the install, leaving it in place"
            );
            item.note(format!(
                "{} already existed before this install; nothing was removed",
                target.display()
            ));
            return;
        }

        match self.backups.remove_partial_install(target).await {
            Ok(()) => item.note("Partially installed files were removed"),
            Err(e) => {
                warn!(target = %target.display(), error = %e, "Partial install cleanup failed");
                item.note(format!("Removing partially installed files failed: {}", e));
            }
        }
    }

    /// Apply the activation plan; failures downgrade to a warning
    async fn reconcile_activation(
        &self,
        item: &mut ItemLifecycle<'_>,
        slug: &str,
        plan: ActivationPlan,
    ) -> bool {
        match plan {
            ActivationPlan::AlreadyActive => {
                item.note("Plugin was already active; activation skipped");
                true
            }
            ActivationPlan::Skip => false,
            ActivationPlan::Activate => {
                match self.activation.activate(slug, self.config.network_wide).await {
                    Ok(()) => {
                        item.note("Plugin activated");
                        true
                    }
                    Err(e) => {
                        warn!(slug, error = %e, "Activation failed");
                        item.note(format!(
                            "Warning: activation failed: {}. The plugin remains installed but inactive.",
                            e
                        ));
                        false
                    }
                }
            }
        }
    }

    async fn audit(&self, batch_id: Uuid, result: &ProcessingResult) {
        let record = AuditRecord::for_result(&self.config.actor_id, batch_id, result);
        if let Err(e) = self.audit.record(&record).await {
            warn!(slug = %result.slug, error = %e, "Failed to write audit record");
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
