//! Domain layer
//!
//! Contains the batch lifecycle logic and the interfaces it depends on.

pub mod audit;
pub mod backup;
pub mod clock;
pub mod compatibility;
pub mod lifecycle;
pub mod plugin;
pub mod rollback;
