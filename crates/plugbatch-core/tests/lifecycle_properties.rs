//! Property-based tests for batch processing and rollback

mod common;

use common::{FakeActivation, FakeBackupStore, FakeInstaller, Harness, install, update};
use plugbatch_core::domain::backup::BackupHandle;
use plugbatch_core::domain::compatibility::{CompatibilityIssue, IssueKind};
use plugbatch_core::domain::lifecycle::ProcessorConfig;
use plugbatch_core::domain::plugin::{ItemStatus, PluginAction, PluginDescriptor};
use plugbatch_core::domain::rollback::{
    BatchRollbackCoordinator, ManifestEntry, MemoryKvStore, RollbackSettings,
};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ItemSpec {
    is_update: bool,
    activate: Option<bool>,
    fail_install: bool,
    incompatible: bool,
    already_active: bool,
}

fn item_spec() -> impl Strategy<Value = ItemSpec> {
    (
        any::<bool>(),
        proptest::option::of(any::<bool>()),
        proptest::bool::weighted(0.3),
        proptest::bool::weighted(0.2),
        any::<bool>(),
    )
        .prop_map(|(is_update, activate, fail_install, incompatible, already_active)| ItemSpec {
            is_update,
            activate,
            fail_install,
            incompatible,
            already_active,
        })
}

fn slug(i: usize) -> String {
    format!("p{}", i)
}

fn descriptors(specs: &[ItemSpec]) -> Vec<PluginDescriptor> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let slug = slug(i);
            let descriptor = if spec.is_update { update(&slug) } else { install(&slug) };
            let descriptor = descriptor.with_activate(spec.activate);
            if spec.incompatible {
                descriptor.with_issues(vec![CompatibilityIssue::new(
                    IssueKind::Other,
                    "Blocked for testing",
                )])
            } else {
                descriptor
            }
        })
        .collect()
}

fn pick<'a>(specs: &[ItemSpec], slugs: &'a [String], f: fn(&ItemSpec) -> bool) -> Vec<&'a str> {
    specs
        .iter()
        .zip(slugs)
        .filter(|(spec, _)| f(spec))
        .map(|(_, s)| s.as_str())
        .collect()
}

fn harness(specs: &[ItemSpec]) -> Harness {
    let slugs: Vec<String> = (0..specs.len()).map(slug).collect();

    Harness::new(
        FakeInstaller::failing(&pick(specs, &slugs, |s| s.fail_install)),
        FakeActivation::with_active(&pick(specs, &slugs, |s| s.is_update && s.already_active)),
        FakeBackupStore::new(),
    )
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    // Counters always add up and every item gets exactly one result, in order
    #[test]
    fn summary_accounts_for_every_item(
        specs in proptest::collection::vec(item_spec(), 0..12),
        auto_activate in any::<bool>(),
    ) {
        let harness = harness(&specs);
        let processor = harness.processor(ProcessorConfig { auto_activate, ..ProcessorConfig::default() });
        let report = block_on(processor.process_batch(&descriptors(&specs), false));

        let s = report.summary;
        prop_assert_eq!(s.installed + s.updated + s.incompatible + s.failed, s.total);
        prop_assert_eq!(s.total, specs.len());
        prop_assert_eq!(report.results.len(), specs.len());

        for (i, (spec, result)) in specs.iter().zip(&report.results).enumerate() {
            prop_assert_eq!(&result.slug, &slug(i));
            prop_assert!(!result.messages.is_empty());
            let expected = if spec.incompatible {
                ItemStatus::Incompatible
            } else if spec.fail_install {
                ItemStatus::Failed
            } else {
                ItemStatus::Success
            };
            prop_assert_eq!(result.status, expected);
        }
    }

    // Override wins, otherwise the global default; already-active updates stay active
    #[test]
    fn activation_follows_effective_setting(
        specs in proptest::collection::vec(item_spec(), 1..10),
        auto_activate in any::<bool>(),
    ) {
        let specs: Vec<_> = specs
            .into_iter()
            .map(|s| ItemSpec { fail_install: false, incompatible: false, ..s })
            .collect();
        let harness = harness(&specs);
        let processor = harness.processor(ProcessorConfig { auto_activate, ..ProcessorConfig::default() });
        let report = block_on(processor.process_batch(&descriptors(&specs), false));

        for (i, (spec, result)) in specs.iter().zip(&report.results).enumerate() {
            let already_active = spec.is_update && spec.already_active;
            let expected = already_active || spec.activate.unwrap_or(auto_activate);
            prop_assert_eq!(result.activated, expected, "item {}", i);

            let activate_called = harness
                .activation
                .activate_calls()
                .iter()
                .any(|(s, _)| *s == slug(i));
            if already_active {
                prop_assert!(!activate_called);
            }
        }
    }

    // A dry run never fails and never touches the collaborators
    #[test]
    fn dry_run_is_side_effect_free(
        specs in proptest::collection::vec(item_spec(), 0..10),
        auto_activate in any::<bool>(),
    ) {
        let harness = harness(&specs);
        let processor = harness.processor(ProcessorConfig { auto_activate, ..ProcessorConfig::default() });
        let report = block_on(processor.process_batch(&descriptors(&specs), true));

        prop_assert_eq!(report.summary.failed, 0);
        for result in &report.results {
            prop_assert!(result.is_dry_run);
            if result.status == ItemStatus::Success {
                prop_assert!(result.has_message_containing("no changes were made"));
            }
        }
        prop_assert!(harness.installer.calls().is_empty());
        prop_assert!(harness.backups.created().is_empty());
        prop_assert!(harness.activation.activate_calls().is_empty());
    }

    // K failing restores out of N: all attempted, exactly K failures
    #[test]
    fn rollback_reports_exactly_the_failed_entries(
        failing in proptest::collection::vec(any::<bool>(), 1..12),
    ) {
        let slugs: Vec<String> = (0..failing.len()).map(slug).collect();
        let failing_slugs: Vec<&str> = slugs
            .iter()
            .zip(&failing)
            .filter(|(_, f)| **f)
            .map(|(s, _)| s.as_str())
            .collect();

        let harness = Harness::default();
        let backups = Arc::new(FakeBackupStore::new().failing_restore(&failing_slugs));
        let coordinator = BatchRollbackCoordinator::new(
            Arc::new(MemoryKvStore::new()),
            backups.clone(),
            harness.paths.clone(),
            RollbackSettings::default(),
        );

        let entries: Vec<_> = slugs
            .iter()
            .map(|s| ManifestEntry {
                slug: s.clone(),
                action: PluginAction::Update,
                status: ItemStatus::Success,
                previous_version: Some("1.0.0".to_string()),
                new_version: "2.0.0".to_string(),
                backup: Some(BackupHandle::new(
                    FakeBackupStore::handle_path(s),
                    "digest",
                    chrono::Utc::now(),
                )),
                plugin_id: s.clone(),
                activated: false,
            })
            .collect();

        let report = block_on(async {
            coordinator.record_batch("prop", entries).await.unwrap();
            coordinator.rollback_batch("prop").await.unwrap()
        });

        let k = failing_slugs.len();
        prop_assert_eq!(report.results.len(), slugs.len());
        prop_assert_eq!(report.failures.len(), k);
        prop_assert_eq!(report.success, k == 0);
        prop_assert_eq!(backups.restored().len(), slugs.len());
    }
}
