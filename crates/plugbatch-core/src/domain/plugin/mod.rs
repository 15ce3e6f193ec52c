//! Plugin domain module
//!
//! Descriptors going into a batch and the results coming out of it.

pub mod descriptor;
pub mod result;

pub use descriptor::{PluginAction, PluginDescriptor, validate_slug};
pub use result::{BatchReport, BatchSummary, ItemStatus, ProcessingResult};
