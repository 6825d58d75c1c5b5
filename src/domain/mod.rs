//! Domain layer for the Taskfeed reconciliation engine
//!
//! This module contains the work item models, configuration models,
//! domain errors and the ports the engine consumes.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
