//! Payment confirmation endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::patch;
use axum::{Json, Router};

use crate::http::response::error_response;
use crate::payments::{PaymentConfirmation, PaymentId};

pub fn router(confirmation: Arc<PaymentConfirmation>) -> Router {
    Router::new()
        .route("/pagamentos/{id}/confirmar", patch(confirm))
        .with_state(confirmation)
}

/// The confirmation runs in its own task: once the pending marker is set,
/// a client hanging up must not leave the payment stuck in it.
async fn confirm(State(confirmation): State<Arc<PaymentConfirmation>>, Path(id): Path<PaymentId>) -> Response {
    let task = tokio::spawn(async move { confirmation.confirm_payment(id).await });

    match task.await {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!(payment_id = id, error = %e, "Payment confirmation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "payment confirmation failed")
        }
    }
}
