//! Admin API.
//!
//! Read-only views of the registry and the circuit breakers, plus a manual
//! breaker reset. Every route requires `Authorization: Bearer <api_key>`;
//! the key is read from the live config, so a reload rotates it.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::config::NodeConfig;
use crate::registry::RegistryStore;
use crate::resilience::BreakerRegistry;

use self::auth::admin_auth_middleware;
use self::handlers::{get_breakers, get_instances, get_status, reset_breaker};

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    /// `None` when this node is not a registry.
    pub store: Option<Arc<RegistryStore>>,
    pub breakers: Arc<BreakerRegistry>,
    pub config: Arc<ArcSwap<NodeConfig>>,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/instances", get(get_instances))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
