//! Payment records as seen by the confirmation flow.

use serde::{Deserialize, Serialize};

pub type PaymentId = u64;
pub type OrderId = u64;

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Criado,
    /// A confirmation attempt is in flight.
    ConfirmacaoPendente,
    /// Confirmed and the order service was updated.
    Confirmado,
    /// Confirmed locally; the order service update did not happen.
    ConfirmadoSemIntegracao,
    Cancelado,
}

impl PaymentStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, PaymentStatus::Confirmado | PaymentStatus::ConfirmadoSemIntegracao)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Criado => "CRIADO",
            PaymentStatus::ConfirmacaoPendente => "CONFIRMACAO_PENDENTE",
            PaymentStatus::Confirmado => "CONFIRMADO",
            PaymentStatus::ConfirmadoSemIntegracao => "CONFIRMADO_SEM_INTEGRACAO",
            PaymentStatus::Cancelado => "CANCELADO",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub status: PaymentStatus,
}

/// Response body of a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub status: PaymentStatus,
}

impl From<&Payment> for ConfirmationResult {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            status: payment.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_wire_format() {
        let result = ConfirmationResult {
            id: 1,
            order_id: 7,
            status: PaymentStatus::ConfirmadoSemIntegracao,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 1, "orderId": 7, "status": "CONFIRMADO_SEM_INTEGRACAO"})
        );
    }

    #[test]
    fn test_status_names_match_serde() {
        for status in [
            PaymentStatus::Criado,
            PaymentStatus::ConfirmacaoPendente,
            PaymentStatus::Confirmado,
            PaymentStatus::ConfirmadoSemIntegracao,
            PaymentStatus::Cancelado,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
