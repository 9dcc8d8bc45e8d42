//! Payment confirmation.
//!
//! # Data Flow
//! ```text
//! PATCH /pagamentos/{id}/confirmar
//!     → confirmation.rs (status checks, pending marker, fallback)
//!     → resilience breaker "orders.updateStatus"
//!     → order_client.rs (discover "pedidos", PUT /pedidos/{orderId}/pago)
//!     → ledger.rs (final status)
//! ```

pub mod confirmation;
pub mod ledger;
pub mod order_client;
pub mod types;

pub use confirmation::{PaymentConfirmation, PaymentError, ORDER_UPDATE_DEPENDENCY};
pub use ledger::{InMemoryPayments, PaymentLedger, TransitionError};
pub use order_client::{OrderClientError, OrderServiceClient};
pub use types::{ConfirmationResult, OrderId, Payment, PaymentId, PaymentStatus};
