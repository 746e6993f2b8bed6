//! Operator metrics.
//!
//! # Metrics
//! - `dex_operator_reconcile_total` (counter): passes by outcome
//! - `dex_operator_reconcile_duration_seconds` (histogram): pass latency
//! - `dex_operator_workload_restarts_total` (counter): Dex restarts
//! - `dex_operator_schema_errors_total` (counter): rejected payloads by integration
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests call these freely.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const RECONCILE_TOTAL: &str = "dex_operator_reconcile_total";
pub const RECONCILE_DURATION: &str = "dex_operator_reconcile_duration_seconds";
pub const WORKLOAD_RESTARTS: &str = "dex_operator_workload_restarts_total";
pub const SCHEMA_ERRORS: &str = "dex_operator_schema_errors_total";

/// Install the Prometheus exporter on `addr` and describe every metric.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %e, address = %addr, "Failed to install Prometheus exporter");
        return;
    }

    describe_counter!(RECONCILE_TOTAL, "Reconcile passes by outcome");
    describe_histogram!(RECONCILE_DURATION, "Reconcile pass duration in seconds");
    describe_counter!(WORKLOAD_RESTARTS, "Dex service restarts");
    describe_counter!(SCHEMA_ERRORS, "Relation payloads rejected by schema validation");

    tracing::info!(address = %addr, "Metrics exporter listening");
}

/// Record one reconcile pass. `outcome` is the resulting status kind.
pub fn record_reconcile(outcome: &'static str, duration: Duration) {
    counter!(RECONCILE_TOTAL, "outcome" => outcome).increment(1);
    histogram!(RECONCILE_DURATION).record(duration.as_secs_f64());
}

pub fn record_restart() {
    counter!(WORKLOAD_RESTARTS).increment(1);
}

pub fn record_schema_error(integration: &str) {
    counter!(SCHEMA_ERRORS, "integration" => integration.to_string()).increment(1);
}
