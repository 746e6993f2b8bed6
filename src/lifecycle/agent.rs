//! The agent's event loop.
//!
//! One consumer drains the event queue; each event runs to completion on a
//! blocking thread before the next is dequeued. The result of every pass is
//! published as an [`AgentStatus`] snapshot for the admin API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::schema::ReconcileConfig;
use crate::reconciler::{
    Event, PassReport, Reconciler, SettingsSummary, UnitStatus, LEADERSHIP_MESSAGE,
};
use crate::relation::RelationStore;
use crate::resilience::backoff::calculate_backoff;
use crate::workload::Workload;

const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of the agent, swapped in after every pass.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub status: UnitStatus,
    pub leader: bool,
    pub passes: u64,
    pub retry_attempt: u32,
    /// Seconds since the epoch of the last pass.
    pub updated_at: u64,
    pub last: Option<PassReport>,
    /// Settings of the most recent successful pass.
    pub settings: Option<SettingsSummary>,
}

impl AgentStatus {
    pub fn starting(leader: bool) -> Self {
        Self {
            status: UnitStatus::maintenance("Starting"),
            leader,
            passes: 0,
            retry_attempt: 0,
            updated_at: now_secs(),
            last: None,
            settings: None,
        }
    }
}

pub type SharedStatus = Arc<ArcSwap<AgentStatus>>;

pub struct Agent<S, W> {
    reconciler: Option<Reconciler<S, W>>,
    events: mpsc::UnboundedReceiver<Event>,
    requeue: mpsc::UnboundedSender<Event>,
    status: SharedStatus,
    retry: ReconcileConfig,
    attempt: u32,
    pending_retry: Option<JoinHandle<()>>,
}

impl<S, W> Agent<S, W>
where
    S: RelationStore + Send + 'static,
    W: Workload + 'static,
{
    pub fn new(
        reconciler: Reconciler<S, W>,
        events: mpsc::UnboundedReceiver<Event>,
        requeue: mpsc::UnboundedSender<Event>,
        status: SharedStatus,
        retry: ReconcileConfig,
    ) -> Self {
        Self {
            reconciler: Some(reconciler),
            events,
            requeue,
            status,
            retry,
            attempt: 0,
            pending_retry: None,
        }
    }

    /// Process events until shutdown or until every sender is gone.
    ///
    /// Returns the reconciler so callers can inspect final state.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Option<Reconciler<S, W>> {
        tracing::info!("Agent event loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Agent event loop stopping");
                    break;
                }
                next = self.events.recv() => match next {
                    Some(event) => {
                        if !self.process(event).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        if let Some(handle) = self.pending_retry.take() {
            handle.abort();
        }
        self.reconciler
    }

    /// Handle one event. `false` when the loop can no longer continue.
    async fn process(&mut self, event: Event) -> bool {
        let Some(mut reconciler) = self.reconciler.take() else {
            return false;
        };

        let task = tokio::task::spawn_blocking(move || {
            let report = reconciler.handle(&event);
            let leader = reconciler.is_leader();
            (reconciler, report, leader)
        });

        let (reconciler, report, leader) = match task.await {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(error = %e, "Reconcile task failed, stopping agent");
                return false;
            }
        };
        self.reconciler = Some(reconciler);

        if let Some(report) = report {
            self.schedule_retry(&report.status);
            self.publish(report, leader);
        }
        true
    }

    fn publish(&self, report: PassReport, leader: bool) {
        let previous = self.status.load();
        let settings = report.settings.clone().or_else(|| previous.settings.clone());
        self.status.store(Arc::new(AgentStatus {
            status: report.status.clone(),
            leader,
            passes: previous.passes + 1,
            retry_attempt: self.attempt,
            updated_at: now_secs(),
            last: Some(report),
            settings,
        }));
    }

    /// Re-dispatch `update-status` with backoff while the unit waits on
    /// something other than leadership.
    fn schedule_retry(&mut self, status: &UnitStatus) {
        if let Some(handle) = self.pending_retry.take() {
            handle.abort();
        }

        let waiting = matches!(status, UnitStatus::Waiting(m) if m != LEADERSHIP_MESSAGE);
        if !waiting || !self.retry.retry_enabled {
            self.attempt = 0;
            return;
        }

        self.attempt = self.attempt.saturating_add(1);
        let delay = calculate_backoff(self.attempt, self.retry.base_delay_ms, self.retry.max_delay_ms);
        tracing::debug!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, "Scheduling retry");

        let tx = self.requeue.clone();
        self.pending_retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::UpdateStatus);
        }));
    }
}

/// Queue `<container>-pebble-ready` once the workload root exists.
pub async fn probe_workload(
    root: PathBuf,
    container: String,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        if root.is_dir() {
            tracing::info!(root = ?root, container = %container, "Workload reachable");
            let _ = events.send(Event::WorkloadReady(container));
            return;
        }
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(PROBE_INTERVAL) => {}
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
