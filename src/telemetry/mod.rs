#![deny(missing_debug_implementations)]

//! Telemetry module.
//!
//! Logging is built on [tracing](https://crates.io/crates/tracing): call
//! [`logging::init`] once per process, passing a `verbose` flag. Metrics
//! are a small Prometheus surface in [`metrics`], started only when
//! `metrics.enable` is set.

/// The logging module.
pub mod logging;

/// Prometheus metrics.
pub mod metrics;

/// Graceful shutdown signal registration.
pub mod shutdown;

pub use logging::*;

/// Re-exports common tracing traits and types.
pub mod prelude {
    pub use super::*;
    pub use tracing::{debug, error, info, span, trace, warn, Level};
    pub use tracing_subscriber::{fmt, prelude::*};
}
