//! Workload rendering and management.
//!
//! # Data Flow
//! ```text
//! Settings
//!     → render.rs (Dex YAML, fully in memory)
//!     → layer.rs (service definition carrying CONFIG_HASH)
//!     → apply() against a Workload
//!         ├── cannot connect      → NotReady
//!         ├── same bytes, same plan, running → Unchanged
//!         └── otherwise           → push, add layer, restart → Restarted
//! ```
//!
//! # Design Decisions
//! - Nothing touches the workload until the artifact is rendered
//! - The active file and the current plan are the only state consulted
//! - [`Workload`] is the seam between the reconciler and the container;
//!   `process.rs` runs Dex locally, `memory.rs` backs tests

pub mod layer;
pub mod memory;
pub mod process;
pub mod render;

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::observability::metrics;

pub use layer::{layer, Layer, Service};
pub use memory::MemoryWorkload;
pub use process::ProcessWorkload;
pub use render::{render, Artifact};

/// Lifecycle of the managed service.
///
/// `Stopped → Starting → Running` on first start, `Running → Restarting →
/// Running` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

impl fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadState::Stopped => "stopped",
            WorkloadState::Starting => "starting",
            WorkloadState::Running => "running",
            WorkloadState::Restarting => "restarting",
        };
        f.write_str(s)
    }
}

/// The container Dex runs in.
pub trait Workload: Send {
    /// Whether the workload agent is reachable.
    fn can_connect(&self) -> bool;

    /// Contents of `path`, `None` when absent.
    fn pull(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Replace `path` with `content`.
    fn push(&mut self, path: &str, content: &[u8]) -> Result<()>;

    /// Merge `layer` into the plan.
    fn add_layer(&mut self, layer: &Layer) -> Result<()>;

    /// Current plan entry for `service`.
    fn service(&self, service: &str) -> Result<Option<Service>>;

    /// Stop (if running) and start `service`.
    fn restart(&mut self, service: &str) -> Result<()>;

    fn state(&self, service: &str) -> WorkloadState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Unchanged,
    Restarted,
}

/// Make the workload run `artifact` under `layer`.
///
/// Restarts only when the active file differs, the plan differs from
/// `layer`, or a service is not running.
pub fn apply(
    workload: &mut dyn Workload,
    config_path: &str,
    artifact: &Artifact,
    layer: &Layer,
) -> Result<ApplyOutcome> {
    if !workload.can_connect() {
        return Err(Error::not_ready("Waiting for the Dex workload to become reachable"));
    }

    let current = workload.pull(config_path)?;
    let mut planned = true;
    for (name, service) in &layer.services {
        if workload.service(name)?.as_ref() != Some(service) {
            planned = false;
            break;
        }
    }
    let all_running = layer
        .services
        .keys()
        .all(|name| workload.state(name) == WorkloadState::Running);

    if current.as_deref() == Some(artifact.as_bytes()) && planned && all_running {
        tracing::debug!(path = %config_path, "Rendered configuration unchanged");
        return Ok(ApplyOutcome::Unchanged);
    }

    workload.push(config_path, artifact.as_bytes())?;
    workload.add_layer(layer)?;
    for name in layer.services.keys() {
        workload.restart(name)?;
        metrics::record_restart();
        tracing::info!(
            service = %name,
            config_hash = %artifact.hash(),
            "Restarted service with new configuration"
        );
    }
    Ok(ApplyOutcome::Restarted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadConfig;
    use crate::settings::Settings;

    fn fixture(port: u16) -> (Artifact, Layer) {
        let settings = Settings {
            issuer_url: "http://dex-auth.kubeflow.svc:5556/dex".to_string(),
            port,
            telemetry_port: 5558,
            enable_password_db: true,
            static_login: None,
            connectors: Vec::new(),
            static_clients: Vec::new(),
            namespace: "kubeflow".to_string(),
        };
        let artifact = render(&settings).unwrap();
        let layer = layer(&settings, &artifact, &WorkloadConfig::default());
        (artifact, layer)
    }

    const PATH: &str = "/etc/dex/config.docker.yaml";

    #[test]
    fn unreachable_workload_is_not_ready() {
        let mut workload = MemoryWorkload::unreachable();
        let (artifact, layer) = fixture(5556);
        let err = apply(&mut workload, PATH, &artifact, &layer).unwrap_err();
        assert!(matches!(err, Error::NotReady(_)));
        assert_eq!(workload.restarts(), 0);
    }

    #[test]
    fn first_apply_starts_service() {
        let mut workload = MemoryWorkload::new();
        let (artifact, layer) = fixture(5556);

        assert_eq!(apply(&mut workload, PATH, &artifact, &layer).unwrap(), ApplyOutcome::Restarted);
        assert_eq!(workload.state("dex"), WorkloadState::Running);
        assert_eq!(workload.pull(PATH).unwrap().as_deref(), Some(artifact.as_bytes()));
        assert_eq!(
            workload.transitions("dex"),
            vec![WorkloadState::Starting, WorkloadState::Running]
        );
    }

    #[test]
    fn identical_artifact_does_not_restart() {
        let mut workload = MemoryWorkload::new();
        let (artifact, layer) = fixture(5556);

        apply(&mut workload, PATH, &artifact, &layer).unwrap();
        assert_eq!(apply(&mut workload, PATH, &artifact, &layer).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(workload.restarts(), 1);
    }

    #[test]
    fn changed_artifact_restarts() {
        let mut workload = MemoryWorkload::new();
        let (a, la) = fixture(5556);
        let (b, lb) = fixture(5555);

        apply(&mut workload, PATH, &a, &la).unwrap();
        assert_eq!(apply(&mut workload, PATH, &b, &lb).unwrap(), ApplyOutcome::Restarted);
        assert_eq!(workload.restarts(), 2);
        assert_eq!(
            workload.transitions("dex"),
            vec![
                WorkloadState::Starting,
                WorkloadState::Running,
                WorkloadState::Restarting,
                WorkloadState::Running,
            ]
        );
    }

    #[test]
    fn layer_change_alone_restarts() {
        let mut workload = MemoryWorkload::new();
        let (artifact, layer) = fixture(5556);
        apply(&mut workload, PATH, &artifact, &layer).unwrap();

        let mut moved = layer.clone();
        if let Some(dex) = moved.services.get_mut("dex") {
            dex.command = format!("/opt/dex/bin/dex serve {}", PATH);
        }
        assert_eq!(apply(&mut workload, PATH, &artifact, &moved).unwrap(), ApplyOutcome::Restarted);
        assert_eq!(workload.restarts(), 2);
        assert_eq!(workload.plan()["dex"], moved.services["dex"]);

        assert_eq!(apply(&mut workload, PATH, &artifact, &moved).unwrap(), ApplyOutcome::Unchanged);
    }

    #[test]
    fn stopped_service_is_started_even_with_same_bytes() {
        let mut workload = MemoryWorkload::new();
        let (artifact, layer) = fixture(5556);
        workload.push(PATH, artifact.as_bytes()).unwrap();

        assert_eq!(apply(&mut workload, PATH, &artifact, &layer).unwrap(), ApplyOutcome::Restarted);
    }
}
