use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::admin::AdminState;
use crate::http::response::error_response;
use crate::registry::InstanceView;
use crate::resilience::BreakerSnapshot;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub roles: Vec<&'static str>,
    pub uptime_secs: u64,
    /// Healthy instances per service, when this node is a registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, usize>>,
    pub breakers: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let config = state.config.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        roles: config.roles(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        services: state.store.as_ref().map(|s| s.services()),
        breakers: state.breakers.snapshots().len(),
    })
}

/// Every registry record, DOWN ones included.
pub async fn get_instances(State(state): State<AdminState>) -> Response {
    match &state.store {
        Some(store) => Json::<Vec<InstanceView>>(store.list_all()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "this node does not run a registry"),
    }
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}

pub async fn reset_breaker(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    if !state.breakers.reset(&name) {
        return error_response(StatusCode::NOT_FOUND, format!("no circuit breaker named '{name}'"));
    }
    tracing::info!(breaker = %name, "Circuit breaker reset by operator");
    Json(state.breakers.breaker(&name).snapshot()).into_response()
}
