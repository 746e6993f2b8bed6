//! Admin API: read-only views of the agent, behind a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::lifecycle::agent::SharedStatus;

use self::auth::admin_auth_middleware;
use self::handlers::{get_settings, get_status};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub status: SharedStatus,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/settings", get(get_settings))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
