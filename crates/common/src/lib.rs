//! Shared configuration, error types, IDs, and observability primitives for
//! CSQL crates.
//!
//! Architecture role:
//! - defines engine configuration passed across layers
//! - provides common [`CsqlError`] / [`Result`] contracts
//! - hosts the prometheus metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::EngineConfig;
pub use error::{CsqlError, Result};
pub use ids::*;
pub use metrics::{global_metrics, MetricsRegistry};
