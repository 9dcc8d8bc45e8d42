//! Outbound HTTP transport.
//!
//! # Responsibilities
//! - Send a fully addressed request to an upstream instance
//! - Enforce connect and response deadlines
//! - Classify failures (refused, timed out, broken)
//!
//! The gateway and the order-service client both go through the
//! `Transport` trait so tests can substitute an in-process fake.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::{BoxFuture, FutureExt};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::time;

use crate::config::TimeoutConfig;

/// Why an upstream call produced no response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to upstream failed: {0}")]
    Connect(String),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

/// Sends requests to upstream instances.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>>;
}

/// hyper-based transport with pooled connections.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeouts.connect()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            request_timeout: timeouts.request(),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>> {
        async move {
            match time::timeout(self.request_timeout, self.client.request(request)).await {
                Ok(Ok(response)) => {
                    let (parts, body) = response.into_parts();
                    Ok(Response::from_parts(parts, Body::new(body)))
                }
                Ok(Err(e)) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
                Ok(Err(e)) => Err(TransportError::Upstream(e.to_string())),
                Err(_) => Err(TransportError::Timeout(self.request_timeout)),
            }
        }
        .boxed()
    }
}
