//! Gateway ingress: every request not claimed by another surface.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::request::request_id;
use crate::http::response::error_response;
use crate::observability::metrics;
use crate::routing::{Router as ServiceRouter, RoutingError, RoutingErrorKind};

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            RoutingErrorKind::NoRoute => StatusCode::NOT_FOUND,
            RoutingErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RoutingErrorKind::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
        };
        error_response(status, self.to_string())
    }
}

/// Catch-all router forwarding to service instances.
pub fn router(gateway: Arc<ServiceRouter>) -> axum::Router {
    axum::Router::new().fallback(forward).with_state(gateway)
}

async fn forward(State(gateway): State<Arc<ServiceRouter>>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request_id(request.headers()).to_string();
    let path = request.uri().path().to_string();

    let (service, result) = gateway.route(request).await;
    let result_kind = result.as_ref().map(|_| ()).map_err(RoutingError::kind);
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            match e.kind() {
                RoutingErrorKind::NoRoute => {
                    tracing::debug!(request_id = %request_id, path = %path, "No service segment")
                }
                _ => tracing::warn!(request_id = %request_id, path = %path, error = %e, "Gateway request failed"),
            }
            e.into_response()
        }
    };

    metrics::record_request(
        &method,
        response.status().as_u16(),
        service_label(service.as_deref(), &result_kind),
        start,
    );
    response
}

/// Metric label for a routed request. Only services that resolved to an
/// instance get their own series; arbitrary path segments do not.
fn service_label<'a>(service: Option<&'a str>, outcome: &Result<(), RoutingErrorKind>) -> &'a str {
    match (service, outcome) {
        (Some(service), Ok(())) | (Some(service), Err(RoutingErrorKind::UpstreamUnreachable)) => service,
        _ => UNRESOLVED_SERVICE,
    }
}

const UNRESOLVED_SERVICE: &str = "unknown";
