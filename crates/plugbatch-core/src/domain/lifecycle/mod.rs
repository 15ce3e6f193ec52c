//! Lifecycle domain module
//!
//! The batch processor and the collaborator interfaces it consumes.
//!
//! # Architecture
//!
//! - **Ports**: `PackageInstaller`, `ActivationController`, `PluginPaths`
//! - **State**: `ItemLifecycle`, the per-item state machine
//! - **Activation**: `ActivationPlan`, override-then-default resolution
//! - **Processor**: `PluginLifecycleProcessor`, the sequential batch driver
//!
//! # Example
//!
//! ```ignore
//! use plugbatch_core::domain::lifecycle::{PluginLifecycleProcessor, ProcessorConfig};
//!
//! let processor = PluginLifecycleProcessor::new(
//!     ProcessorConfig::default(),
//!     installer,
//!     activation,
//!     backups,
//!     paths,
//! )
//! .with_oracle(checker);
//!
//! let report = processor.process_batch(&descriptors, false).await;
//! std::process::exit(report.exit_code());
//! ```

pub mod activation;
pub mod ports;
pub mod processor;
pub mod state;

pub use activation::{ActivationPlan, effective_activation};
pub use ports::{ActivationController, ActivationError, InstallError, PackageInstaller, PluginPaths};
pub use processor::{DEFAULT_ACTOR, PluginLifecycleProcessor, ProcessorConfig};
pub use state::{ItemLifecycle, LifecycleState};
