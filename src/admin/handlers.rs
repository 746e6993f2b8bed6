use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::reconciler::{SettingsSummary, UnitStatus};
use crate::workload::{ApplyOutcome, WorkloadState};

#[derive(Serialize)]
pub struct StatusView {
    pub version: &'static str,
    pub unit: UnitStatus,
    pub leader: bool,
    pub passes: u64,
    pub retry_attempt: u32,
    pub updated_at: u64,
    pub last_event: Option<String>,
    pub last_apply: Option<ApplyOutcome>,
    pub workload: Option<WorkloadState>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<StatusView> {
    let snapshot = state.status.load();
    let last = snapshot.last.as_ref();

    Json(StatusView {
        version: env!("CARGO_PKG_VERSION"),
        unit: snapshot.status.clone(),
        leader: snapshot.leader,
        passes: snapshot.passes,
        retry_attempt: snapshot.retry_attempt,
        updated_at: snapshot.updated_at,
        last_event: last.map(|r| r.event.clone()),
        last_apply: last.and_then(|r| r.apply),
        workload: last.map(|r| r.workload),
    })
}

/// Settings from the last successful pass.
///
/// 404 until a pass has succeeded. Only ids are exposed; secrets and
/// password hashes never leave the agent.
pub async fn get_settings(
    State(state): State<AdminState>,
) -> Result<Json<SettingsSummary>, StatusCode> {
    let snapshot = state.status.load();
    snapshot
        .settings
        .clone()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
