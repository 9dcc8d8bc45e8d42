//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway / order-service client
//!     → transport.rs (absolute-URI request, pooled connection)
//!     → Upstream instance
//! ```
//!
//! # Design Decisions
//! - One pooled client per node, shared by every caller
//! - Every outbound call has a connect and a response deadline

pub mod transport;

pub use transport::{HttpTransport, Transport, TransportError};
