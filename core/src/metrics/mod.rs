//! Prometheus metrics for bulk write observability.
//!
//! # Usage
//!
//! ```ignore
//! use bulkmerge::metrics::bulk;
//!
//! let _timer = bulk::time_statement("upsert");
//! // ... run the statement ...
//! // Duration recorded automatically on drop
//!
//! bulk::record_operation("upsert", bulk::status::SUCCESS);
//! ```
//!
//! Metrics live in the default registry, so an application exposing
//! `prometheus::gather()` picks them up without extra wiring.

pub mod bulk;
pub mod definitions;
pub mod timer;

pub use timer::TimerGuard;

use prometheus::{Encoder, TextEncoder};

/// Encode all metrics in the Prometheus text exposition format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
