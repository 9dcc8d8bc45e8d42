//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Logical service name
//!     → selector.rs (canonicalize, ask the instance source)
//!     → round_robin.rs (rotate through healthy instances)
//!     → Return instance or NoHealthyInstance
//! ```
//!
//! # Design Decisions
//! - Only healthy, in-lease instances reach the balancer
//! - Rotation cursor per service name
//! - Order is registration order, so rotation is predictable

pub mod round_robin;
pub mod selector;

use std::fmt::Debug;

use crate::registry::InstanceView;

pub use round_robin::RoundRobin;
pub use selector::{InstanceSelector, SelectionError};

/// Strategy choosing one instance out of a service's healthy set.
pub trait LoadBalancer: Send + Sync + Debug {
    fn next_instance(&self, service_name: &str, instances: &[InstanceView]) -> Option<InstanceView>;
}
