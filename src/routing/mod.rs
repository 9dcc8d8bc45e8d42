//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (/{service}/{rest}?query)
//!     → matcher.rs (split service segment from forwarded path)
//!     → router.rs (select instance, rewrite headers, forward)
//!     → Return: upstream response or RoutingError
//! ```
//!
//! # Design Decisions
//! - Routes are not configured: any first path segment names a service
//! - Unknown or fully expired services are 503, unreachable instances 502
//! - Deterministic: the same path always resolves to the same service

pub mod matcher;
pub mod router;

pub use matcher::{match_service, ServiceRoute};
pub use router::{Router, RoutingError, RoutingErrorKind};
