//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Instance → POST register / heartbeat / deregister
//!     → store.rs (per-instance records, lease check)
//!
//! Every sweep interval:
//!     sweeper.rs
//!     → store.rs (lapsed leases → DOWN → purged)
//!
//! Selector / discovery query
//!     → store.rs list_healthy (UP and within lease, registration order)
//! ```
//!
//! # Design Decisions
//! - Single authoritative in-memory table, injected where needed
//! - Lazy (read-time) plus active (sweep) expiry
//! - Service names are case-insensitive, stored lowercase
//! - agent.rs is the instance side of the same protocol

pub mod agent;
pub mod instance;
pub mod store;
pub mod sweeper;

pub use agent::RegistrationAgent;
pub use instance::{
    canonical_service_name, InstanceId, InstanceRef, InstanceStatus, InstanceView, Registration,
    ServiceInstance,
};
pub use store::{RegistryError, RegistryStore, SweepReport};
pub use sweeper::HeartbeatProcessor;
