//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call to a dependency:
//!     → registry.rs (breaker for the dependency name, created lazily)
//!     → circuit_breaker.rs (admit or reject, enforce the call timeout,
//!       record the outcome)
//!
//! Registration retries:
//!     → backoff.rs (exponential delay with jitter)
//! ```
//!
//! # Design Decisions
//! - Every outbound call has a deadline
//! - No inline retries on the request path; callers fall back instead
//! - One breaker per dependency name, never global

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    BreakerError, BreakerPolicy, BreakerSnapshot, CallOutcome, CallPermit, CircuitBreaker, CircuitState,
};
pub use registry::BreakerRegistry;
