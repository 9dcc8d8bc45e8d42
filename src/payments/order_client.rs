//! Client for the order service's "mark as paid" operation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use thiserror::Error;

use crate::config::PaymentConfig;
use crate::http::request::X_REQUEST_ID;
use crate::load_balancer::{InstanceSelector, SelectionError};
use crate::net::{Transport, TransportError};
use crate::payments::types::OrderId;

/// Why the order service was not updated.
#[derive(Debug, Error)]
pub enum OrderClientError {
    #[error("order service unavailable: {0}")]
    Unavailable(#[from] SelectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("order service answered {0}")]
    Status(u16),

    #[error("could not build order request: {0}")]
    InvalidRequest(String),
}

/// Typed client over the order service, discovered through the registry.
#[derive(Clone)]
pub struct OrderServiceClient {
    selector: InstanceSelector,
    transport: Arc<dyn Transport>,
    service_name: String,
    path_prefix: String,
}

impl OrderServiceClient {
    pub fn new(selector: InstanceSelector, transport: Arc<dyn Transport>, config: &PaymentConfig) -> Self {
        Self {
            selector,
            transport,
            service_name: config.order_service.clone(),
            path_prefix: config.order_path_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// `PUT {prefix}/{orderId}/pago` on one healthy order instance.
    /// Any non-2xx answer is an error.
    pub async fn mark_paid(&self, order_id: OrderId) -> Result<(), OrderClientError> {
        let instance = self.selector.select(&self.service_name).await?;
        let uri = format!("http://{}{}/{}/pago", instance.authority(), self.path_prefix, order_id);

        let request = Request::builder()
            .method(Method::PUT)
            .uri(&uri)
            .header(header::CONTENT_LENGTH, 0)
            .header(X_REQUEST_ID, uuid::Uuid::new_v4().to_string())
            .body(Body::empty())
            .map_err(|e| OrderClientError::InvalidRequest(e.to_string()))?;

        tracing::debug!(order_id, instance_id = %instance.instance_id, uri = %uri, "Marking order as paid");

        let response = self.transport.send(request).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(OrderClientError::Status(status.as_u16()))
        }
    }
}
