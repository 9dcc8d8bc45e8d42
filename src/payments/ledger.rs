//! Payment storage boundary.
//!
//! Persistence of payments belongs to another component; the confirmation
//! flow only needs lookups and atomic status transitions, expressed by
//! `PaymentLedger`. `InMemoryPayments` backs a standalone node and tests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::payments::types::{Payment, PaymentId, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("payment {0} not found")]
    NotFound(PaymentId),

    /// The payment was not in the expected status; carries the current record.
    #[error("payment {} is {}", .0.id, .0.status)]
    Conflict(Payment),
}

pub trait PaymentLedger: Send + Sync {
    fn get(&self, id: PaymentId) -> Option<Payment>;

    /// Insert or replace a payment.
    fn insert(&self, payment: Payment);

    /// Move `id` from `expected` to `next` atomically.
    fn transition(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Payment, TransitionError>;
}

/// DashMap-backed ledger.
#[derive(Debug, Default)]
pub struct InMemoryPayments {
    payments: DashMap<PaymentId, Payment>,
}

impl InMemoryPayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

impl PaymentLedger for InMemoryPayments {
    fn get(&self, id: PaymentId) -> Option<Payment> {
        self.payments.get(&id).map(|p| p.clone())
    }

    fn insert(&self, payment: Payment) {
        self.payments.insert(payment.id, payment);
    }

    fn transition(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Payment, TransitionError> {
        match self.payments.entry(id) {
            Entry::Vacant(_) => Err(TransitionError::NotFound(id)),
            Entry::Occupied(mut entry) => {
                let payment = entry.get_mut();
                if payment.status != expected {
                    return Err(TransitionError::Conflict(payment.clone()));
                }
                payment.status = next;
                Ok(payment.clone())
            }
        }
    }
}
