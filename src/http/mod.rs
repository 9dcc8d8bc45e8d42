//! HTTP surfaces of a node.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → /health
//!     → registry.rs (registration protocol, discovery query)
//!     → payments.rs (payment confirmation)
//!     → admin (bearer-protected operator API)
//!     → gateway.rs (everything else, forwarded by the routing layer)
//! ```

pub mod gateway;
pub mod headers;
pub mod payments;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
