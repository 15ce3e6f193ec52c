//! Plugbatch CLI - install, update and roll back plugin batches

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use plugbatch_core::config::Config;
use plugbatch_core::domain::audit::AuditRecord;
use plugbatch_core::domain::backup::{BackupStore, FsBackupStore};
use plugbatch_core::domain::compatibility::HostCompatibilityChecker;
use plugbatch_core::domain::lifecycle::PluginLifecycleProcessor;
use plugbatch_core::domain::plugin::{BatchReport, PluginDescriptor};
use plugbatch_core::domain::rollback::{BatchRollbackCoordinator, ManifestEntry};
use plugbatch_core::infrastructure::{
    DirectoryPackageInstaller, PluginDirectory, SqliteActivationRegistry, SqliteAuditLog,
    SqliteKvStore,
};
use plugbatch_core::queue::{build_queue, load_queue_file};
use plugbatch_core::report;
use plugbatch_core::storage::Database;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "plugbatch")]
#[command(author, version, about = "Batch plugin installs and updates with rollback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update plugins from unpacked package directories
    Process {
        /// Package directories, processed in order
        #[arg(required = true)]
        packages: Vec<PathBuf>,
        /// Simulate without touching anything
        #[arg(short, long)]
        dry_run: bool,
        /// Activate every plugin in the batch
        #[arg(long, conflicts_with = "no_activate")]
        activate: bool,
        /// Never activate plugins in the batch
        #[arg(long)]
        no_activate: bool,
        /// Actor recorded in the audit trail
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Process a JSON queue file of descriptors
    Queue {
        /// Queue file
        file: PathBuf,
        /// Simulate without touching anything
        #[arg(short, long)]
        dry_run: bool,
        /// Actor recorded in the audit trail
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Batch rollback
    Rollback {
        #[command(subcommand)]
        action: RollbackAction,
    },

    /// Show the audit trail
    Audit {
        /// Number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum RollbackAction {
    /// List batches that can still be rolled back
    List,
    /// Show a batch manifest
    Show { id: String },
    /// Roll back a batch
    Run {
        id: String,
        /// Actor recorded in the audit trail
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Remove expired manifests and old backups
    Cleanup,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Show the config file path
    Path,
}

/// Collaborators wired from the loaded configuration
struct Services {
    config: Config,
    db: Database,
    paths: Arc<PluginDirectory>,
    backups: Arc<FsBackupStore>,
    activation: Arc<SqliteActivationRegistry>,
    audit: Arc<SqliteAuditLog>,
}

impl Services {
    async fn open() -> anyhow::Result<Self> {
        let config = Config::load()?;
        config.validate()?;

        let db = Database::open(&config.paths.database).await?;
        let paths = Arc::new(PluginDirectory::new(&config.paths.plugins_dir));
        let backups = Arc::new(FsBackupStore::new(&config.paths.backup_dir));
        let activation = Arc::new(SqliteActivationRegistry::new(db.clone(), paths.clone()));
        let audit = Arc::new(SqliteAuditLog::new(db.clone()));
        debug!(database = %config.paths.database.display(), "Services ready");

        Ok(Self {
            config,
            db,
            paths,
            backups,
            activation,
            audit,
        })
    }

    fn processor(&self, actor: &str) -> PluginLifecycleProcessor {
        let checker =
            HostCompatibilityChecker::new(self.config.host_environment(), self.paths.clone());
        PluginLifecycleProcessor::new(
            self.config.processor_config(actor),
            Arc::new(DirectoryPackageInstaller::new()),
            self.activation.clone(),
            self.backups.clone(),
            self.paths.clone(),
        )
        .with_oracle(Arc::new(checker))
        .with_audit_sink(self.audit.clone())
    }

    fn coordinator(&self, actor: &str) -> anyhow::Result<BatchRollbackCoordinator> {
        Ok(BatchRollbackCoordinator::new(
            Arc::new(SqliteKvStore::new(self.db.clone())),
            self.backups.clone(),
            self.paths.clone(),
            self.config.rollback_settings()?,
        )
        .with_activation(self.activation.clone())
        .with_audit_sink(self.audit.clone())
        .with_actor(actor))
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so JSON output stays parseable
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("plugbatch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<plugbatch_core::Error>() {
        Some(core) => {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Process {
            packages,
            dry_run,
            activate,
            no_activate,
            actor,
        } => {
            let services = Services::open().await?;
            let override_activation = match (activate, no_activate) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let queue = build_queue(&packages, &*services.paths, override_activation)?;
            cmd_process(&services, &queue, dry_run, &actor, format, quiet).await
        }

        Commands::Queue {
            file,
            dry_run,
            actor,
        } => {
            let services = Services::open().await?;
            let queue = load_queue_file(&file)?;
            cmd_process(&services, &queue, dry_run, &actor, format, quiet).await
        }

        Commands::Rollback { action } => {
            let services = Services::open().await?;
            cmd_rollback(&services, action, format, quiet).await
        }

        Commands::Audit { limit } => {
            let services = Services::open().await?;
            cmd_audit(&services, limit, format).await
        }

        Commands::Config { action } => cmd_config(action, quiet).map(|()| 0),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_process(
    services: &Services,
    queue: &[PluginDescriptor],
    dry_run: bool,
    actor: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<i32> {
    info!(items = queue.len(), dry_run, actor, "Processing batch");
    let report = services.processor(actor).process_batch(queue, dry_run).await;

    let recorded = if !dry_run && services.config.rollback.enabled {
        record_for_rollback(services, actor, &report).await
    } else {
        false
    };

    match format {
        OutputFormat::Json => println!("{}", report::to_json(&report)?),
        OutputFormat::Text if quiet => println!("{}", summary_line(&report)),
        OutputFormat::Text => {
            println!("{}", report::render_batch_text(&report));
            if let Some(hint) = rollback_hint(&report, recorded) {
                println!("\n{}", hint);
            }
        }
    }

    Ok(report.exit_code())
}

/// Record the applied batch, returning whether it can be rolled back
///
/// The batch has already been applied; a lost manifest only costs the rollback option.
async fn record_for_rollback(services: &Services, actor: &str, report: &BatchReport) -> bool {
    let coordinator = match services.coordinator(actor) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            warn!(error = %e, "Rollback settings invalid, batch not recorded");
            return false;
        }
    };
    let batch_id = report.batch_id.to_string();
    match coordinator
        .record_batch(&batch_id, ManifestEntry::from_report(report))
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(batch_id = %batch_id, error = %e, "Failed to record batch for rollback");
            false
        }
    }
}

/// Rollback hint for a batch that changed something, if it was recorded
fn rollback_hint(report: &BatchReport, recorded: bool) -> Option<String> {
    if !recorded || report.successful().next().is_none() {
        return None;
    }
    Some(format!(
        "Roll back with: plugbatch rollback run {}",
        report.batch_id
    ))
}

fn summary_line(report: &BatchReport) -> String {
    let s = &report.summary;
    format!(
        "{} total, {} installed, {} updated, {} incompatible, {} failed",
        s.total, s.installed, s.updated, s.incompatible, s.failed
    )
}

async fn cmd_rollback(
    services: &Services,
    action: RollbackAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<i32> {
    let now = Utc::now();

    match action {
        RollbackAction::List => {
            let coordinator = services.coordinator("cli")?;
            let manifests = coordinator.get_active_batches().await?;
            match format {
                OutputFormat::Json => println!("{}", report::to_json(&manifests)?),
                OutputFormat::Text => println!("{}", report::render_manifest_list(&manifests, now)),
            }
            Ok(0)
        }

        RollbackAction::Show { id } => {
            let coordinator = services.coordinator("cli")?;
            let manifest = coordinator
                .get_batch_manifest(&id)
                .await?
                .ok_or_else(|| plugbatch_core::Error::BatchNotFound(id.clone()))?;
            match format {
                OutputFormat::Json => println!("{}", report::to_json(&manifest)?),
                OutputFormat::Text => println!("{}", report::render_manifest(&manifest, now)),
            }
            Ok(0)
        }

        RollbackAction::Run { id, actor } => {
            let coordinator = services.coordinator(&actor)?;
            let rollback = coordinator.rollback_batch(&id).await?;
            match format {
                OutputFormat::Json => println!("{}", report::to_json(&rollback)?),
                OutputFormat::Text if quiet => println!(
                    "{} of {} entries reverted",
                    rollback.reverted(),
                    rollback.results.len()
                ),
                OutputFormat::Text => println!("{}", report::render_rollback_text(&rollback)),
            }
            Ok(if rollback.success { 0 } else { 1 })
        }

        RollbackAction::Cleanup => {
            let coordinator = services.coordinator("cli")?;
            let manifests = coordinator.cleanup_expired().await?;
            let retention = chrono::Duration::hours(i64::from(
                coordinator.settings().retention_hours,
            ));
            let backups = services.backups.prune_older_than(retention).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "manifests_removed": manifests, "backups_removed": backups })
                ),
                OutputFormat::Text if !quiet => println!(
                    "Removed {} expired manifest(s) and {} old backup(s)",
                    manifests, backups
                ),
                OutputFormat::Text => {}
            }
            Ok(0)
        }
    }
}

async fn cmd_audit(services: &Services, limit: u32, format: OutputFormat) -> anyhow::Result<i32> {
    let records = services.audit.recent(limit).await?;
    match format {
        OutputFormat::Json => println!("{}", report::to_json(&records)?),
        OutputFormat::Text if records.is_empty() => println!("No audit records yet."),
        OutputFormat::Text => {
            for record in &records {
                println!("{}", audit_line(record));
            }
        }
    }
    Ok(0)
}

fn audit_line(record: &AuditRecord) -> String {
    let batch = record
        .batch_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:<16} {:<12} {:<20}{}  batch={} actor={}  {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.action.as_str(),
        record.outcome.as_str(),
        record.slug,
        if record.dry_run { " (dry run)" } else { "" },
        batch,
        record.actor_id,
        record.message
    )
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.validate()?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
