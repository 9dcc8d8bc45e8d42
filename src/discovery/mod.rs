//! Instance discovery for selectors.
//!
//! # Data Flow
//! ```text
//! InstanceSelector::select(name)
//!     → InstanceSource::healthy_instances(name)
//!         - RegistryStore (same process, always current)
//!         - RemoteRegistry (GET /registry/instances, lease-aware cache)
//! ```
//!
//! # Design Decisions
//! - Sources return wire views so both kinds are interchangeable
//! - A source never returns an instance whose lease has lapsed

pub mod remote;

use futures_util::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

use crate::registry::{InstanceView, RegistryStore};

pub use remote::RemoteRegistry;

/// Errors from an instance source.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("registry unreachable: {0}")]
    RegistryUnavailable(String),

    #[error("registry answered with status {0}")]
    RegistryStatus(u16),
}

/// Anything that can list the live instances of a service.
pub trait InstanceSource: Send + Sync {
    /// UP, in-lease instances of `service_name` in registration order.
    fn healthy_instances<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceView>, DiscoveryError>>;
}

impl InstanceSource for RegistryStore {
    fn healthy_instances<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceView>, DiscoveryError>> {
        future::ready(Ok(self.healthy_views(service_name))).boxed()
    }
}
