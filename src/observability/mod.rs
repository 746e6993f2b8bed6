//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reconciler, relation, workload
//!     → logging.rs (structured log events, one span per pass)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape of the operator's own exporter
//! ```
//!
//! Dex's own telemetry is separate; see `relation::observability`.

pub mod logging;
pub mod metrics;
