//! Gateway dispatch.
//!
//! # Responsibilities
//! - Resolve the target service from the request path
//! - Pick a healthy instance through the selector
//! - Rewrite the request for the instance and forward it
//! - Map every failure to a distinct, typed error
//!
//! # Design Decisions
//! - The request body is streamed, never buffered
//! - No retries: a request is forwarded at most once
//! - Upstream status codes (including 5xx) are passed through untouched

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, Response, Uri};
use thiserror::Error;

use crate::http::headers::{append_forwarded_for, set_forwarded, strip_hop_by_hop};
use crate::load_balancer::{InstanceSelector, SelectionError};
use crate::net::{Transport, TransportError};
use crate::routing::matcher::match_service;

/// Why the gateway could not produce an upstream response.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no service segment in path '{path}'")]
    NoRoute { path: String },

    #[error("service '{service}' unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("invalid upstream target '{target}'")]
    InvalidTarget { target: String },

    #[error("instance '{instance_id}' of '{service}' unreachable: {source}")]
    UpstreamUnreachable {
        service: String,
        instance_id: String,
        #[source]
        source: TransportError,
    },
}

/// Coarse classification of a [`RoutingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingErrorKind {
    NoRoute,
    ServiceUnavailable,
    UpstreamUnreachable,
}

impl RoutingError {
    pub fn kind(&self) -> RoutingErrorKind {
        match self {
            RoutingError::NoRoute { .. } => RoutingErrorKind::NoRoute,
            RoutingError::ServiceUnavailable { .. } => RoutingErrorKind::ServiceUnavailable,
            // A registered instance whose address cannot form a URI is as
            // unreachable as one that refuses connections.
            RoutingError::InvalidTarget { .. } | RoutingError::UpstreamUnreachable { .. } => {
                RoutingErrorKind::UpstreamUnreachable
            }
        }
    }
}

/// Routes requests of the form `/{service}/{rest}` to a service instance.
#[derive(Clone)]
pub struct Router {
    selector: InstanceSelector,
    transport: Arc<dyn Transport>,
}

impl Router {
    pub fn new(selector: InstanceSelector, transport: Arc<dyn Transport>) -> Self {
        Self {
            selector,
            transport,
        }
    }

    /// Forward `request` to an instance of the service named by its first
    /// path segment. Returns the service name alongside the outcome.
    pub async fn route(&self, request: Request<Body>) -> (Option<String>, Result<Response<Body>, RoutingError>) {
        let Some(route) = match_service(request.uri()) else {
            let path = request.uri().path().to_string();
            return (None, Err(RoutingError::NoRoute { path }));
        };
        let service = route.service_name.clone();

        let instance = match self.selector.select(&route.service_name).await {
            Ok(instance) => instance,
            Err(e) => {
                let reason = match e {
                    SelectionError::NoHealthyInstance(_) => "no healthy instance".to_string(),
                    SelectionError::Discovery(e) => e.to_string(),
                };
                return (Some(service), Err(RoutingError::ServiceUnavailable { service: route.service_name, reason }));
            }
        };

        let target = format!("http://{}{}", instance.authority(), route.forward_path_and_query);
        let Ok(uri) = target.parse::<Uri>() else {
            return (Some(service), Err(RoutingError::InvalidTarget { target }));
        };

        let (mut parts, body) = request.into_parts();
        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let original_host = parts.headers.remove(header::HOST);

        strip_hop_by_hop(&mut parts.headers);
        set_forwarded(&mut parts.headers, original_host, &route.prefix);
        if let Some(client) = client_addr {
            append_forwarded_for(&mut parts.headers, &client);
        }
        parts.uri = uri;

        tracing::debug!(
            service = %route.service_name,
            instance_id = %instance.instance_id,
            upstream = %parts.uri,
            "Forwarding request"
        );

        let result = match self.transport.send(Request::from_parts(parts, body)).await {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                Ok(response)
            }
            Err(source) => Err(RoutingError::UpstreamUnreachable {
                service: route.service_name,
                instance_id: instance.instance_id,
                source,
            }),
        };
        (Some(service), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::InstanceSource;
    use crate::registry::{Registration, RegistryStore};
    use axum::http::{HeaderValue, StatusCode};
    use futures_util::future::{BoxFuture, FutureExt};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::advance;

    /// Records forwarded requests and answers 200, or fails every call.
    #[derive(Default)]
    struct FakeTransport {
        seen: Mutex<Vec<(Uri, axum::http::HeaderMap)>>,
        refuse: bool,
    }

    impl Transport for FakeTransport {
        fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>> {
            self.seen
                .lock()
                .unwrap()
                .push((request.uri().clone(), request.headers().clone()));
            let result = if self.refuse {
                Err(TransportError::Connect("refused".into()))
            } else {
                let mut response = Response::new(Body::from("ok"));
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
                Ok(response)
            };
            async move { result }.boxed()
        }
    }

    fn setup(transport: Arc<FakeTransport>) -> (Arc<RegistryStore>, Router) {
        let store = Arc::new(RegistryStore::new(Duration::from_secs(30), Duration::from_secs(10)));
        let source: Arc<dyn InstanceSource> = store.clone();
        let router = Router::new(InstanceSelector::new(source), transport);
        (store, router)
    }

    fn request(uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::HOST, "gateway.local")
            .header(header::CONNECTION, "keep-alive")
            .header("x-request-id", "req-1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_with_prefix_stripped() {
        let transport = Arc::new(FakeTransport::default());
        let (store, router) = setup(transport.clone());
        store
            .register(Registration::new("pedidos", "127.0.0.1", 9000).with_instance_id("orders-1"))
            .unwrap();

        let (service, result) = router.route(request("/pedidos/123?x=1")).await;
        let response = result.unwrap();
        assert_eq!(service.as_deref(), Some("pedidos"));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONNECTION).is_none());

        let seen = transport.seen.lock().unwrap();
        let (uri, headers) = &seen[0];
        assert_eq!(uri.to_string(), "http://127.0.0.1:9000/123?x=1");
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(headers["x-forwarded-host"], "gateway.local");
        assert_eq!(headers["x-forwarded-prefix"], "/pedidos");
        assert_eq!(headers["x-request-id"], "req-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_instance_is_unavailable() {
        let transport = Arc::new(FakeTransport::default());
        let (store, router) = setup(transport.clone());
        store
            .register(Registration::new("pedidos", "127.0.0.1", 9000).with_instance_id("orders-1"))
            .unwrap();

        // No heartbeat for longer than the 30s lease.
        advance(Duration::from_secs(40)).await;

        let (_, result) = router.route(request("/pedidos/123")).await;
        assert!(matches!(result, Err(RoutingError::ServiceUnavailable { service, .. }) if service == "pedidos"));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_instance() {
        let transport = Arc::new(FakeTransport {
            refuse: true,
            ..Default::default()
        });
        let (store, router) = setup(transport);
        store
            .register(Registration::new("pedidos", "127.0.0.1", 9000).with_instance_id("orders-1"))
            .unwrap();

        let (_, result) = router.route(request("/pedidos/123")).await;
        assert!(matches!(
            result,
            Err(RoutingError::UpstreamUnreachable { instance_id, .. }) if instance_id == "orders-1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_has_no_route() {
        let (_, router) = setup(Arc::new(FakeTransport::default()));
        let (service, result) = router.route(request("/")).await;
        assert!(service.is_none());
        assert!(matches!(result, Err(RoutingError::NoRoute { .. })));
    }
}
