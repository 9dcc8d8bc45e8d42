//! Registration protocol and discovery query endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;

use crate::http::response::error_response;
use crate::registry::{InstanceRef, InstanceView, Registration, RegistryError, RegistryStore};

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match self {
            RegistryError::InvalidRegistration(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        error_response(status, self.to_string())
    }
}

/// Registration payloads are a few hundred bytes.
const REGISTRATION_BODY_LIMIT: usize = 16 * 1024;

pub fn router(store: Arc<RegistryStore>) -> Router {
    Router::new()
        .route("/registry/register", post(register))
        .route("/registry/heartbeat", post(heartbeat))
        .route("/registry/deregister", post(deregister))
        .route("/registry/instances", get(instances))
        .route("/registry/services", get(services))
        .layer(RequestBodyLimitLayer::new(REGISTRATION_BODY_LIMIT))
        .with_state(store)
}

async fn register(
    State(store): State<Arc<RegistryStore>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<Json<InstanceRef>, RegistryError> {
    let Json(registration) = body.map_err(|e| RegistryError::InvalidRegistration(e.body_text()))?;
    let instance_id = store.register(registration)?;
    Ok(Json(InstanceRef { instance_id }))
}

async fn heartbeat(
    State(store): State<Arc<RegistryStore>>,
    Json(body): Json<InstanceRef>,
) -> Result<StatusCode, RegistryError> {
    store.heartbeat(&body.instance_id)?;
    Ok(StatusCode::OK)
}

async fn deregister(State(store): State<Arc<RegistryStore>>, Json(body): Json<InstanceRef>) -> StatusCode {
    store.deregister(&body.instance_id);
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancesQuery {
    service_name: Option<String>,
}

async fn instances(
    State(store): State<Arc<RegistryStore>>,
    Query(query): Query<InstancesQuery>,
) -> Response {
    match query.service_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Json::<Vec<InstanceView>>(store.healthy_views(name)).into_response(),
        _ => error_response(StatusCode::BAD_REQUEST, "serviceName is required"),
    }
}

async fn services(State(store): State<Arc<RegistryStore>>) -> Json<BTreeMap<String, usize>> {
    Json(store.services())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Arc<RegistryStore>, Router) {
        let store = Arc::new(RegistryStore::new(Duration::from_secs(30), Duration::from_secs(10)));
        (store.clone(), router(store))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_query() {
        let (_, app) = app();

        let res = app
            .clone()
            .oneshot(post_json(
                "/registry/register",
                r#"{"serviceName":"Pedidos","host":"127.0.0.1","port":9000,"instanceId":"orders-1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json(res).await["instanceId"], "orders-1");

        let res = app
            .clone()
            .oneshot(
                Request::get("/registry/instances?serviceName=pedidos")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json(res).await;
        assert_eq!(body[0]["instanceId"], "orders-1");
        assert_eq!(body[0]["serviceName"], "pedidos");
        assert_eq!(body[0]["status"], "UP");

        let res = app
            .oneshot(Request::get("/registry/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json(res).await, serde_json::json!({"pedidos": 1}));
    }

    #[tokio::test]
    async fn test_invalid_registration_is_400() {
        let (store, app) = app();

        let res = app
            .clone()
            .oneshot(post_json("/registry/register", r#"{"host":"127.0.0.1","port":9000}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(post_json("/registry/register", r#"{"serviceName":"x","host":"h","port":"nope"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_is_404_and_deregister_is_idempotent() {
        let (_, app) = app();

        let res = app
            .clone()
            .oneshot(post_json("/registry/heartbeat", r#"{"instanceId":"ghost"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(post_json("/registry/deregister", r#"{"instanceId":"ghost"}"#))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_instances_requires_service_name() {
        let (_, app) = app();
        let res = app
            .oneshot(Request::get("/registry/instances").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_registration_is_rejected() {
        let (store, app) = app();
        let body = format!(r#"{{"serviceName":"{}","host":"h","port":1}}"#, "x".repeat(REGISTRATION_BODY_LIMIT));
        let req = Request::post("/registry/register")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(store.is_empty());
    }
}
