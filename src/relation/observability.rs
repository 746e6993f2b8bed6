//! Observability integrations.
//!
//! The payloads of these interfaces are defined by the observability stack.
//! We only publish the scrape job for Dex's telemetry listener and take note
//! of what the other side has sent; nothing here feeds the rendered config.

use serde::Serialize;
use serde_json::json;

use crate::config::UnitConfig;
use crate::error::Result;
use crate::relation::endpoints::{GRAFANA_DASHBOARD, LOGGING, METRICS_ENDPOINT};
use crate::relation::store::{Bag, RelationStore};

/// Port of Dex's telemetry listener.
pub const TELEMETRY_PORT: u16 = 5558;

/// Path Dex serves Prometheus metrics on.
pub const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Serialize)]
struct ScrapeMetadata<'a> {
    model: &'a str,
    application: &'a str,
    unit: &'a str,
}

/// The `scrape_jobs` value advertised on `metrics-endpoint`.
pub fn scrape_jobs(port: u16) -> serde_json::Value {
    json!([{
        "metrics_path": METRICS_PATH,
        "static_configs": [{ "targets": [format!("*:{}", port)] }],
    }])
}

/// Publish the scrape job on every `metrics-endpoint` relation.
pub fn publish_scrape_jobs(store: &mut dyn RelationStore, unit: &UnitConfig) -> Result<usize> {
    let jobs = serde_json::to_string(&scrape_jobs(TELEMETRY_PORT))?;
    let metadata = serde_json::to_string(&ScrapeMetadata {
        model: &unit.model_name,
        application: &unit.app_name,
        unit: &unit.unit_name,
    })?;

    let mut changed = 0;
    for relation in store.relations(METRICS_ENDPOINT)? {
        let mut entries = Bag::new();
        entries.insert("scrape_jobs".to_string(), jobs.clone());
        entries.insert("scrape_metadata".to_string(), metadata.clone());
        if store.update_local_data(&relation, entries)? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Counts of related observability applications, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObservabilityLinks {
    pub metrics: usize,
    pub dashboards: usize,
    pub logging: usize,
}

/// Count related applications per observability endpoint.
pub fn links(store: &dyn RelationStore) -> Result<ObservabilityLinks> {
    let logging = store.relations(LOGGING)?;
    for relation in &logging {
        let bag = store.remote_data(relation)?;
        tracing::debug!(
            remote_app = %relation.remote_app,
            keys = bag.len(),
            "Logging endpoint related"
        );
    }

    Ok(ObservabilityLinks {
        metrics: store.relations(METRICS_ENDPOINT)?.len(),
        dashboards: store.relations(GRAFANA_DASHBOARD)?.len(),
        logging: logging.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::store::MemoryRelationStore;

    #[test]
    fn scrape_job_targets_telemetry_port() {
        let jobs = scrape_jobs(TELEMETRY_PORT);
        assert_eq!(jobs[0]["metrics_path"], "/metrics");
        assert_eq!(jobs[0]["static_configs"][0]["targets"][0], "*:5558");
    }

    #[test]
    fn publishes_scrape_job_and_metadata() {
        let mut store = MemoryRelationStore::new();
        let rel = store.add_relation(METRICS_ENDPOINT, "prometheus-k8s");

        let unit = UnitConfig::default();
        assert_eq!(publish_scrape_jobs(&mut store, &unit).unwrap(), 1);

        let bag = store.local_data(&rel).unwrap();
        let metadata: serde_json::Value = serde_json::from_str(&bag["scrape_metadata"]).unwrap();
        assert_eq!(metadata["application"], "dex-auth");
        assert_eq!(metadata["model"], "kubeflow");
    }

    #[test]
    fn counts_links() {
        let mut store = MemoryRelationStore::new();
        store.add_relation(GRAFANA_DASHBOARD, "grafana-k8s");
        store.add_relation(LOGGING, "loki-k8s");
        store.add_relation(LOGGING, "loki-k8s-2");

        assert_eq!(
            links(&store).unwrap(),
            ObservabilityLinks {
                metrics: 0,
                dashboards: 1,
                logging: 2,
            }
        );
    }
}
