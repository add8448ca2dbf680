//! Shared configuration, error types, IDs, and metrics for pdq crates.
//!
//! Architecture role:
//! - defines scheduler/session configuration passed across layers
//! - provides common [`PdqError`] / [`Result`] contracts
//! - hosts the Prometheus metrics registry
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

pub use config::{RunMode, SchedulerConfig, SchedulingPolicy, SessionVariables, SinkDopDivisors};
pub use error::{PdqError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;
