//! End-to-end tests over the real filesystem and an in-memory SQLite database

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use plugbatch_core::domain::audit::AuditOutcome;
use plugbatch_core::domain::backup::FsBackupStore;
use plugbatch_core::domain::compatibility::{HostCompatibilityChecker, HostEnvironment};
use plugbatch_core::domain::lifecycle::{
    ActivationController, PluginLifecycleProcessor, ProcessorConfig,
};
use plugbatch_core::domain::plugin::{ItemStatus, PluginAction, PluginDescriptor};
use plugbatch_core::domain::rollback::{BatchRollbackCoordinator, ManifestEntry, RollbackSettings};
use plugbatch_core::infrastructure::{
    DirectoryPackageInstaller, PluginDirectory, SqliteActivationRegistry, SqliteAuditLog,
    SqliteKvStore,
};
use plugbatch_core::queue::build_queue;
use plugbatch_core::storage::Database;

struct Site {
    _tmp: TempDir,
    root: PathBuf,
    plugins: PathBuf,
    db: Database,
    paths: Arc<PluginDirectory>,
    backups: Arc<FsBackupStore>,
    activation: Arc<SqliteActivationRegistry>,
    audit: Arc<SqliteAuditLog>,
}

fn write_package(dir: &Path, slug: &str, version: &str, requires_runtime: Option<&str>) {
    fs::create_dir_all(dir.join("src")).unwrap();
    let requires = requires_runtime
        .map(|r| format!(r#","requires_runtime":"{}""#, r))
        .unwrap_or_default();
    fs::write(
        dir.join("plugin.json"),
        format!(
            r#"{{"slug":"{}","name":"{}","version":"{}"{}}}"#,
            slug, slug, version, requires
        ),
    )
    .unwrap();
    fs::write(dir.join("src").join("main.txt"), format!("{} {}", slug, version)).unwrap();
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

async fn site() -> Site {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let plugins = root.join("plugins");
    fs::create_dir_all(&plugins).unwrap();

    let db = Database::in_memory().await.expect("database");
    let paths = Arc::new(PluginDirectory::new(&plugins));
    let backups = Arc::new(FsBackupStore::new(root.join("backups")));
    let activation = Arc::new(SqliteActivationRegistry::new(db.clone(), paths.clone()));
    let audit = Arc::new(SqliteAuditLog::new(db.clone()));

    Site {
        _tmp: tmp,
        root,
        plugins,
        db,
        paths,
        backups,
        activation,
        audit,
    }
}

impl Site {
    fn processor(&self, config: ProcessorConfig) -> PluginLifecycleProcessor {
        let checker = HostCompatibilityChecker::new(
            HostEnvironment {
                runtime_version: "8.1".to_string(),
                host_version: "6.4".to_string(),
            },
            self.paths.clone(),
        );
        PluginLifecycleProcessor::new(
            config,
            Arc::new(DirectoryPackageInstaller::new()),
            self.activation.clone(),
            self.backups.clone(),
            self.paths.clone(),
        )
        .with_oracle(Arc::new(checker))
        .with_audit_sink(self.audit.clone())
    }

    fn coordinator(&self) -> BatchRollbackCoordinator {
        BatchRollbackCoordinator::new(
            Arc::new(SqliteKvStore::new(self.db.clone())),
            self.backups.clone(),
            self.paths.clone(),
            RollbackSettings::default(),
        )
        .with_activation(self.activation.clone())
        .with_audit_sink(self.audit.clone())
    }
}

#[tokio::test]
async fn test_batch_then_rollback_restores_previous_state() {
    let site = site().await;
    write_package(&site.plugins.join("seo"), "seo", "1.0.0", None);
    site.activation.activate("seo", false).await.unwrap();

    let uploads = site.root.join("uploads");
    write_package(&uploads.join("seo"), "seo", "2.0.0", None);
    write_package(&uploads.join("forms"), "forms", "0.3.0", None);
    write_package(&uploads.join("future"), "future", "1.0.0", Some("9.0"));

    let queue = build_queue(
        &[uploads.join("seo"), uploads.join("forms"), uploads.join("future")],
        &*site.paths,
        Some(true),
    )
    .unwrap();
    assert_eq!(queue[0].action, PluginAction::Update);

    let config = ProcessorConfig {
        retain_backups: true,
        ..ProcessorConfig::default()
    };
    let report = site.processor(config).process_batch(&queue, false).await;

    assert_eq!(report.summary.updated, 1);
    assert_eq!(report.summary.installed, 1);
    assert_eq!(report.summary.incompatible, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(read(&site.plugins.join("seo/src/main.txt")), "seo 2.0.0");
    assert_eq!(read(&site.plugins.join("forms/src/main.txt")), "forms 0.3.0");
    assert!(!site.plugins.join("future").exists());
    assert!(site.activation.is_active("forms").await.unwrap());
    assert!(report.result_for("seo").unwrap().activated);

    let coordinator = site.coordinator();
    let batch_id = report.batch_id.to_string();
    coordinator
        .record_batch(&batch_id, ManifestEntry::from_report(&report))
        .await
        .unwrap();

    let rollback = coordinator.rollback_batch(&batch_id).await.unwrap();
    assert!(rollback.success, "{:?}", rollback.failures);

    assert_eq!(read(&site.plugins.join("seo/src/main.txt")), "seo 1.0.0");
    assert!(!site.plugins.join("forms").exists());
    assert!(!site.activation.is_active("forms").await.unwrap());
    assert!(coordinator.get_batch_manifest(&batch_id).await.unwrap().is_none());

    let audit = site.audit.for_batch(report.batch_id).await.unwrap();
    assert_eq!(audit.len(), 6);
    assert_eq!(audit[2].outcome, AuditOutcome::Incompatible);
}

#[tokio::test]
async fn test_failed_update_is_restored_from_backup() {
    let site = site().await;
    write_package(&site.plugins.join("seo"), "seo", "1.0.0", None);
    fs::write(site.plugins.join("seo/settings.ini"), "custom=1").unwrap();

    let mut descriptor = build_queue(
        &[{
            let pkg = site.root.join("uploads/seo");
            write_package(&pkg, "seo", "2.0.0", None);
            pkg
        }],
        &*site.paths,
        None,
    )
    .unwrap()
    .remove(0);
    // Package vanishes between queueing and processing
    fs::remove_dir_all(site.root.join("uploads/seo")).unwrap();
    descriptor.activate = None;

    let report = site
        .processor(ProcessorConfig::default())
        .process_batch(&[descriptor], false)
        .await;

    let seo = &report.results[0];
    assert_eq!(seo.status, ItemStatus::Failed);
    assert!(seo.has_message_containing("Previous version restored"));
    assert_eq!(read(&site.plugins.join("seo/src/main.txt")), "seo 1.0.0");
    assert_eq!(read(&site.plugins.join("seo/settings.ini")), "custom=1");
}

#[tokio::test]
async fn test_dry_run_leaves_disk_untouched() {
    let site = site().await;
    let uploads = site.root.join("uploads");
    write_package(&uploads.join("forms"), "forms", "0.3.0", None);

    let queue = build_queue(&[uploads.join("forms")], &*site.paths, Some(true)).unwrap();
    let report = site
        .processor(ProcessorConfig::default())
        .process_batch(&queue, true)
        .await;

    assert!(report.results[0].is_dry_run);
    assert!(report.results[0].activated);
    assert!(!site.plugins.join("forms").exists());
    assert!(!site.root.join("backups").exists());
    assert!(!site.activation.is_active("forms").await.unwrap());
}

#[tokio::test]
async fn test_install_over_existing_plugin_without_oracle_keeps_it() {
    let site = site().await;
    write_package(&site.plugins.join("seo"), "seo", "1.0.0", None);
    let package = site.root.join("uploads/seo");
    write_package(&package, "seo", "2.0.0", None);

    let descriptor = PluginDescriptor::install("seo", &package, "seo", "2.0.0").unwrap();
    let processor = PluginLifecycleProcessor::new(
        ProcessorConfig::default(),
        Arc::new(DirectoryPackageInstaller::new()),
        site.activation.clone(),
        site.backups.clone(),
        site.paths.clone(),
    );
    let report = processor.process_batch(&[descriptor], false).await;

    let seo = &report.results[0];
    assert_eq!(seo.status, ItemStatus::Failed);
    assert!(seo.has_message_containing("already exists"));
    assert!(seo.has_message_containing("nothing was removed"));
    assert_eq!(read(&site.plugins.join("seo/src/main.txt")), "seo 1.0.0");
}
