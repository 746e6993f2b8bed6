//! Lifecycle reconciliation.
//!
//! # Data Flow
//! ```text
//! Event
//!     → DISPATCH table (ignored unless listed)
//!     → reconcile():
//!         leadership gate
//!         → options file + stored unit state
//!         → consume ingress, oidc-client (relation)
//!         → assemble (settings)
//!         → render + layer (workload, in memory)
//!         → apply (push, restart only on change)
//!         → publish ingress route, dex-oidc-config, scrape job
//!     → UnitStatus + PassReport
//! ```
//!
//! # Design Decisions
//! - Every observed event runs the same idempotent pass; there are no
//!   per-event code paths beyond leadership
//! - Errors never escape a pass: each one maps to a status
//! - The workload and relation store are owned here and lent by reference to
//!   each stage

pub mod event;
pub mod status;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::loader::load_options;
use crate::config::OperatorConfig;
use crate::error::Result;
use crate::observability::metrics;
use crate::relation::endpoints::{self, INGRESS, OIDC_CLIENT};
use crate::relation::observability::{self as obs, ObservabilityLinks};
use crate::relation::oidc_config::publish_oidc_config;
use crate::relation::{IngressRoute, OidcClient, RelationExchanger, RelationStore, SchemaVersion};
use crate::settings::{assemble, Inputs, Settings, StoredState};
use crate::workload::{self, ApplyOutcome, Workload, WorkloadState};

pub use event::{Event, EventKind, RelationEventKind};
pub use status::UnitStatus;

/// Path prefix Dex is served under behind ingress.
pub const INGRESS_PREFIX: &str = "/dex";

pub const LEADERSHIP_MESSAGE: &str = "Waiting for leadership";

/// What to do for an event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Reconcile,
    /// Record leadership, then reconcile.
    AssumeLeadership,
}

/// The single event → action table. Kinds not listed are ignored.
///
/// Relation events are further restricted to declared endpoints.
const DISPATCH: &[(EventKind, Action)] = &[
    (EventKind::Install, Action::Reconcile),
    (EventKind::ConfigChanged, Action::Reconcile),
    (EventKind::UpgradeCharm, Action::Reconcile),
    (EventKind::LeaderElected, Action::AssumeLeadership),
    (EventKind::WorkloadReady, Action::Reconcile),
    (EventKind::UpdateStatus, Action::Reconcile),
    (EventKind::Relation, Action::Reconcile),
];

fn action_for(event: &Event) -> Option<Action> {
    if let Event::Relation { endpoint, .. } = event {
        endpoints::endpoint(endpoint)?;
    }
    DISPATCH
        .iter()
        .find(|(kind, _)| *kind == event.kind())
        .map(|(_, action)| *action)
}

/// Values derived by a successful pass, for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSummary {
    pub issuer_url: String,
    pub port: u16,
    pub connector_ids: Vec<String>,
    pub client_ids: Vec<String>,
    pub artifact_hash: String,
    pub ingress_version: Option<String>,
    pub links: ObservabilityLinks,
}

impl SettingsSummary {
    fn new(settings: &Settings, artifact_hash: String, ingress: Option<SchemaVersion>, links: ObservabilityLinks) -> Self {
        Self {
            issuer_url: settings.issuer_url.clone(),
            port: settings.port,
            connector_ids: settings.connectors.iter().map(|c| c.id().to_string()).collect(),
            client_ids: settings.static_clients.iter().map(|c| c.id.clone()).collect(),
            artifact_hash,
            ingress_version: ingress.map(|v| v.to_string()),
            links,
        }
    }
}

/// Outcome of handling one event.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub event: String,
    pub status: UnitStatus,
    pub apply: Option<ApplyOutcome>,
    pub workload: WorkloadState,
    pub settings: Option<SettingsSummary>,
    pub duration_ms: u64,
}

struct Applied {
    outcome: ApplyOutcome,
    summary: SettingsSummary,
}

/// Drives the unit toward the state its inputs describe.
pub struct Reconciler<S, W> {
    config: OperatorConfig,
    leader: bool,
    store: S,
    workload: W,
    state: Option<StoredState>,
    status: UnitStatus,
}

impl<S: RelationStore, W: Workload> Reconciler<S, W> {
    pub fn new(config: OperatorConfig, store: S, workload: W) -> Self {
        Self {
            leader: config.unit.leader,
            config,
            store,
            workload,
            state: None,
            status: UnitStatus::maintenance("Starting"),
        }
    }

    pub fn status(&self) -> &UnitStatus {
        &self.status
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn workload(&self) -> &W {
        &self.workload
    }

    pub fn workload_mut(&mut self) -> &mut W {
        &mut self.workload
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn set_leader(&mut self, leader: bool) {
        self.leader = leader;
    }

    /// Handle one event. `None` when the event is not observed.
    pub fn handle(&mut self, event: &Event) -> Option<PassReport> {
        let Some(action) = action_for(event) else {
            tracing::debug!(event = %event, "Ignoring unobserved event");
            return None;
        };

        if action == Action::AssumeLeadership {
            self.leader = true;
        }
        Some(self.reconcile(&event.to_string()))
    }

    /// Run one full, idempotent pass.
    pub fn reconcile(&mut self, trigger: &str) -> PassReport {
        let span = tracing::info_span!("reconcile", event = %trigger);
        let _enter = span.enter();
        let started = Instant::now();

        let (status, applied) = if !self.leader {
            (UnitStatus::waiting(LEADERSHIP_MESSAGE), None)
        } else {
            match self.pass() {
                Ok(applied) => (UnitStatus::Active, Some(applied)),
                Err(e) => {
                    let status = e.status();
                    if e.is_retryable() {
                        tracing::info!(error = %e, "Pass deferred");
                    } else {
                        tracing::warn!(error = %e, "Pass blocked");
                    }
                    (status, None)
                }
            }
        };

        let elapsed = started.elapsed();
        metrics::record_reconcile(status.name(), elapsed);
        if status != self.status {
            tracing::info!(from = %self.status, to = %status, "Unit status changed");
        }
        self.status = status.clone();

        let service_state = self.workload.state(&self.config.workload.service_name);
        let (apply, settings) = match applied {
            Some(a) => (Some(a.outcome), Some(a.summary)),
            None => (None, None),
        };

        PassReport {
            event: trigger.to_string(),
            status,
            apply,
            workload: service_state,
            settings,
            duration_ms: duration_ms(elapsed),
        }
    }

    fn pass(&mut self) -> Result<Applied> {
        let options = load_options(&self.config.paths.options_file)?;
        let state = self.stored_state()?;

        let mut exchanger = RelationExchanger::new(&mut self.store);
        exchanger.advertise(INGRESS)?;
        exchanger.advertise(OIDC_CLIENT)?;

        let ingress_version = exchanger.negotiate(INGRESS)?;
        let routes = exchanger.consume::<IngressRoute>(INGRESS)?;
        for route in &routes {
            tracing::debug!(remote_app = %route.remote_app, prefix = %route.payload.prefix, "Ingress route received");
        }
        let oidc_clients = exchanger.consume::<OidcClient>(OIDC_CLIENT)?;

        let settings = assemble(&options, &Inputs { oidc_clients }, &self.config.unit, &state)?;
        let artifact = workload::render(&settings)?;
        let layer = workload::layer(&settings, &artifact, &self.config.workload);

        let outcome = workload::apply(
            &mut self.workload,
            &self.config.workload.config_path,
            &artifact,
            &layer,
        )?;

        let mut exchanger = RelationExchanger::new(&mut self.store);
        if let Some(version) = ingress_version {
            let route = IngressRoute {
                service: self.config.unit.app_name.clone(),
                port: settings.port,
                namespace: Some(self.config.unit.model_name.clone()),
                prefix: INGRESS_PREFIX.to_string(),
                rewrite: Some(INGRESS_PREFIX.to_string()),
            };
            exchanger.publish(INGRESS, &route, version)?;
        }
        publish_oidc_config(exchanger.store(), &settings.issuer_url)?;
        obs::publish_scrape_jobs(exchanger.store(), &self.config.unit)?;
        let links = obs::links(exchanger.store())?;

        tracing::debug!(
            issuer = %settings.issuer_url,
            clients = settings.static_clients.len(),
            connectors = settings.connectors.len(),
            outcome = ?outcome,
            "Pass complete"
        );

        Ok(Applied {
            outcome,
            summary: SettingsSummary::new(&settings, artifact.hash(), ingress_version, links),
        })
    }

    fn stored_state(&mut self) -> Result<StoredState> {
        if let Some(state) = &self.state {
            return Ok(state.clone());
        }
        let state = StoredState::load_or_init(&self.config.paths.state_file)?;
        self.state = Some(state.clone());
        Ok(state)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
