//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: a watcher or admin bind error is fatal
//! - The event loop starts before the first event is queued
//! - `install` is queued on every start; the pass is idempotent

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::ConfigWatcher;
use crate::config::OperatorConfig;
use crate::lifecycle::agent::{probe_workload, Agent, AgentStatus};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::observability::metrics::init_metrics;
use crate::reconciler::{Event, PassReport, Reconciler};
use crate::relation::FsRelationStore;
use crate::workload::ProcessWorkload;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot watch inputs: {0}")]
    Watch(#[from] notify::Error),

    #[error("invalid address {address}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("cannot bind admin API: {0}")]
    Bind(#[from] std::io::Error),

    #[error("event loop failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn reconciler(config: &OperatorConfig) -> Reconciler<FsRelationStore, ProcessWorkload> {
    Reconciler::new(
        config.clone(),
        FsRelationStore::new(config.paths.relations_dir.clone()),
        ProcessWorkload::from_config(&config.workload),
    )
}

fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|source| StartupError::Address {
        address: address.to_string(),
        source,
    })
}

/// Run a single hook and return its report. `None` if the hook is ignored.
pub fn dispatch(config: OperatorConfig, hook: &str) -> Option<PassReport> {
    let event: Event = match hook.parse() {
        Ok(event) => event,
        Err(never) => match never {},
    };
    tracing::info!(hook = %hook, "Dispatching hook");
    reconciler(&config).handle(&event)
}

/// Run the long-lived agent until SIGINT or SIGTERM.
pub async fn run(config: OperatorConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();

    if config.observability.metrics_enabled {
        init_metrics(parse_addr(&config.observability.metrics_address)?);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let _watcher =
        ConfigWatcher::new(&config.paths.options_file, &config.paths.relations_dir, tx.clone()).run()?;

    let status = Arc::new(ArcSwap::from_pointee(AgentStatus::starting(config.unit.leader)));
    let agent = Agent::new(
        reconciler(&config),
        rx,
        tx.clone(),
        status.clone(),
        config.reconcile.clone(),
    );
    let agent_task = tokio::spawn(agent.run(shutdown.subscribe()));

    if config.admin.enabled {
        let addr = parse_addr(&config.admin.bind_address)?;
        let listener = TcpListener::bind(addr).await?;
        let router = setup_admin_router(AdminState {
            status: status.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let mut stop = shutdown.subscribe();
        tracing::info!(address = %addr, "Admin API listening");
        tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let _ = tx.send(Event::Install);
    tokio::spawn(probe_workload(
        config.workload.root.clone(),
        config.workload.service_name.clone(),
        tx.clone(),
        shutdown.subscribe(),
    ));

    tracing::info!(
        app = %config.unit.app_name,
        unit = %config.unit.unit_name,
        leader = config.unit.leader,
        "Agent started"
    );

    wait_for_signal().await;
    shutdown.trigger();
    agent_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
