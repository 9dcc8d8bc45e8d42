//! Payment confirmation with a degraded fallback.
//!
//! # Flow
//! ```text
//! CRIADO → CONFIRMACAO_PENDENTE → call order service through the breaker
//!     → success:                  CONFIRMADO
//!     → failure / breaker open:   CONFIRMADO_SEM_INTEGRACAO
//! ```
//!
//! The fallback is a successful outcome, not an error: the payment is
//! confirmed locally and the order update is left for reconciliation.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::error_response;
use crate::observability::metrics;
use crate::payments::ledger::{PaymentLedger, TransitionError};
use crate::payments::order_client::OrderServiceClient;
use crate::payments::types::{ConfirmationResult, PaymentId, PaymentStatus};
use crate::resilience::BreakerRegistry;

/// Breaker name guarding the order-status update.
pub const ORDER_UPDATE_DEPENDENCY: &str = "orders.updateStatus";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment {0} not found")]
    NotFound(PaymentId),

    #[error("payment {id} cannot be confirmed while {status}")]
    InvalidState { id: PaymentId, status: PaymentStatus },
}

impl From<TransitionError> for PaymentError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NotFound(id) => PaymentError::NotFound(id),
            TransitionError::Conflict(payment) => PaymentError::InvalidState {
                id: payment.id,
                status: payment.status,
            },
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = match self {
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::InvalidState { .. } => StatusCode::CONFLICT,
        };
        error_response(status, self.to_string())
    }
}

/// Confirms payments and keeps the order service in step when it can.
pub struct PaymentConfirmation {
    ledger: Arc<dyn PaymentLedger>,
    orders: Arc<OrderServiceClient>,
    breakers: Arc<BreakerRegistry>,
}

impl PaymentConfirmation {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        orders: Arc<OrderServiceClient>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            ledger,
            orders,
            breakers,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn PaymentLedger> {
        &self.ledger
    }

    pub async fn confirm_payment(&self, id: PaymentId) -> Result<ConfirmationResult, PaymentError> {
        let payment = self.ledger.get(id).ok_or(PaymentError::NotFound(id))?;

        match payment.status {
            status if status.is_confirmed() => {
                tracing::debug!(payment_id = id, %status, "Payment already confirmed");
                return Ok(ConfirmationResult::from(&payment));
            }
            PaymentStatus::Criado => {}
            status => return Err(PaymentError::InvalidState { id, status }),
        }

        let pending = match self
            .ledger
            .transition(id, PaymentStatus::Criado, PaymentStatus::ConfirmacaoPendente)
        {
            Ok(pending) => pending,
            // Lost a race with another confirmation that already finished.
            Err(TransitionError::Conflict(current)) if current.status.is_confirmed() => {
                return Ok(ConfirmationResult::from(&current));
            }
            Err(e) => return Err(e.into()),
        };

        let orders = Arc::clone(&self.orders);
        let order_id = pending.order_id;
        let outcome = self
            .breakers
            .execute(ORDER_UPDATE_DEPENDENCY, move || async move {
                orders.mark_paid(order_id).await
            })
            .await;

        let status = match outcome {
            Ok(()) => PaymentStatus::Confirmado,
            Err(e) => {
                tracing::warn!(
                    payment_id = id,
                    order_id,
                    breaker_open = e.is_open(),
                    error = %e,
                    "Order service not updated, confirming without integration"
                );
                PaymentStatus::ConfirmadoSemIntegracao
            }
        };

        let confirmed = self
            .ledger
            .transition(id, PaymentStatus::ConfirmacaoPendente, status)?;

        tracing::info!(payment_id = id, order_id, status = %confirmed.status, "Payment confirmed");
        metrics::record_confirmation(confirmed.status.as_str());
        Ok(ConfirmationResult::from(&confirmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, PaymentConfig};
    use crate::load_balancer::InstanceSelector;
    use crate::net::{Transport, TransportError};
    use crate::payments::ledger::InMemoryPayments;
    use crate::payments::types::Payment;
    use crate::registry::{Registration, RegistryStore};
    use crate::resilience::CircuitState;
    use axum::body::Body;
    use axum::http::{Method, Request, Response, Uri};
    use futures_util::future::{BoxFuture, FutureExt};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every request with a fixed status and remembers what it saw.
    struct FixedStatus {
        status: StatusCode,
        seen: Mutex<Vec<(Method, Uri)>>,
    }

    impl FixedStatus {
        fn new(status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                status,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Transport for FixedStatus {
        fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, TransportError>> {
            self.seen
                .lock()
                .unwrap()
                .push((request.method().clone(), request.uri().clone()));
            let mut response = Response::new(Body::empty());
            *response.status_mut() = self.status;
            async move { Ok(response) }.boxed()
        }
    }

    struct Fixture {
        store: Arc<RegistryStore>,
        ledger: Arc<InMemoryPayments>,
        breakers: Arc<BreakerRegistry>,
        service: PaymentConfirmation,
    }

    fn fixture(transport: Arc<FixedStatus>) -> Fixture {
        let store = Arc::new(RegistryStore::new(Duration::from_secs(30), Duration::from_secs(10)));
        let selector = InstanceSelector::new(store.clone());
        let orders = Arc::new(OrderServiceClient::new(selector, transport, &PaymentConfig::default()));
        let ledger = Arc::new(InMemoryPayments::new());
        let breakers = Arc::new(BreakerRegistry::from_config(
            &CircuitBreakerConfig::default(),
            Duration::from_secs(10),
        ));
        for id in 1..=5 {
            ledger.insert(Payment {
                id,
                order_id: id * 10,
                status: PaymentStatus::Criado,
            });
        }
        let service = PaymentConfirmation::new(ledger.clone(), orders, breakers.clone());
        Fixture {
            store,
            ledger,
            breakers,
            service,
        }
    }

    fn register_orders(store: &RegistryStore) {
        store
            .register(Registration::new("pedidos", "127.0.0.1", 9000).with_instance_id("orders-1"))
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_with_integration() {
        let transport = FixedStatus::new(StatusCode::OK);
        let fx = fixture(transport.clone());
        register_orders(&fx.store);

        let result = fx.service.confirm_payment(1).await.unwrap();
        assert_eq!(result.status, PaymentStatus::Confirmado);
        assert_eq!(result.order_id, 10);
        assert_eq!(fx.ledger.get(1).unwrap().status, PaymentStatus::Confirmado);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0, Method::PUT);
        assert_eq!(seen[0].1.to_string(), "http://127.0.0.1:9000/pedidos/10/pago");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_falls_back() {
        let transport = FixedStatus::new(StatusCode::INTERNAL_SERVER_ERROR);
        let fx = fixture(transport.clone());
        register_orders(&fx.store);

        let result = fx.service.confirm_payment(1).await.unwrap();
        assert_eq!(result.status, PaymentStatus::ConfirmadoSemIntegracao);
        assert_eq!(
            fx.ledger.get(1).unwrap().status,
            PaymentStatus::ConfirmadoSemIntegracao
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_order_instance_falls_back() {
        let transport = FixedStatus::new(StatusCode::OK);
        let fx = fixture(transport.clone());

        let result = fx.service.confirm_payment(1).await.unwrap();
        assert_eq!(result.status, PaymentStatus::ConfirmadoSemIntegracao);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_remote_call() {
        let transport = FixedStatus::new(StatusCode::SERVICE_UNAVAILABLE);
        let fx = fixture(transport.clone());
        register_orders(&fx.store);

        fx.service.confirm_payment(1).await.unwrap();
        fx.service.confirm_payment(2).await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(
            fx.breakers.breaker(ORDER_UPDATE_DEPENDENCY).state(),
            CircuitState::Open
        );

        let result = fx.service.confirm_payment(3).await.unwrap();
        assert_eq!(result.status, PaymentStatus::ConfirmadoSemIntegracao);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_confirmed_is_returned_as_is() {
        let transport = FixedStatus::new(StatusCode::OK);
        let fx = fixture(transport.clone());
        fx.ledger.insert(Payment {
            id: 9,
            order_id: 90,
            status: PaymentStatus::ConfirmadoSemIntegracao,
        });

        let result = fx.service.confirm_payment(9).await.unwrap();
        assert_eq!(result.status, PaymentStatus::ConfirmadoSemIntegracao);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_states() {
        let fx = fixture(FixedStatus::new(StatusCode::OK));
        fx.ledger.insert(Payment {
            id: 9,
            order_id: 90,
            status: PaymentStatus::Cancelado,
        });

        assert_eq!(
            fx.service.confirm_payment(9).await,
            Err(PaymentError::InvalidState {
                id: 9,
                status: PaymentStatus::Cancelado
            })
        );
        assert_eq!(
            fx.service.confirm_payment(404).await,
            Err(PaymentError::NotFound(404))
        );
    }
}
