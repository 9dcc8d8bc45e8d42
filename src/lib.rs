//! Service discovery registry, gateway and resilient payment confirmation.
//!
//! One binary, three roles selected by configuration:
//! - registry: instances register, heartbeat and deregister; leases expire
//! - gateway: `/{service}/{rest}` is forwarded round-robin to a healthy instance
//! - payments: confirming a payment updates the order service through a
//!   circuit breaker, falling back to a degraded confirmation

pub mod admin;
pub mod config;
pub mod discovery;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod payments;
pub mod registry;
pub mod resilience;
pub mod routing;

pub use config::NodeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
