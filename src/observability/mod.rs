//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Instance IDs, service names and breaker names are structured fields
//! - The request ID is carried by the HTTP trace span
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
