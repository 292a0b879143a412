//! Prometheus metrics.

use eyre::Result;
use lazy_static::lazy_static;
use prometheus_exporter::{
    prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge},
    start,
};

lazy_static! {
    /// Number of receivers currently registered as active.
    pub static ref ACTIVE_RECEIVERS: IntGauge =
        register_int_gauge!("active_receivers", "currently registered active receivers").unwrap();
    /// Total blocks durably stored and reported via `AddBlock`.
    pub static ref BLOCKS_REPORTED: IntCounter =
        register_int_counter!("blocks_reported_total", "blocks reported to the tracker").unwrap();
    /// Total `AddBlock` RPCs that failed or timed out.
    pub static ref BLOCKS_UNREPORTED: IntCounter =
        register_int_counter!("blocks_unreported_total", "blocks stored but never acknowledged").unwrap();
    /// Logical time of the most recently allocated batch.
    pub static ref LAST_ALLOCATED_BATCH_TIME: IntGauge =
        register_int_gauge!("last_allocated_batch_time", "most recent allocated batch time").unwrap();
}

/// Starts the metrics exporter on `addr` (spec §6 `metrics.addr`).
pub fn init(addr: &str) -> Result<()> {
    start(addr.parse()?)?;
    Ok(())
}
