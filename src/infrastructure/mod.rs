//! Infrastructure layer module
//!
//! This module contains the adapters around the engine:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Remote work-queue adapters
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod logging;
pub mod remote;
