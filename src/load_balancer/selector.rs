//! Instance selection for a logical service name.

use std::sync::Arc;

use thiserror::Error;

use crate::discovery::{DiscoveryError, InstanceSource};
use crate::load_balancer::{round_robin::RoundRobin, LoadBalancer};
use crate::registry::{canonical_service_name, InstanceView};

/// Why no instance could be selected.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no healthy instance of '{0}'")]
    NoHealthyInstance(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Picks one healthy instance of a service, rotating across calls.
#[derive(Clone)]
pub struct InstanceSelector {
    source: Arc<dyn InstanceSource>,
    balancer: Arc<dyn LoadBalancer>,
}

impl InstanceSelector {
    /// Round-robin selection over `source`.
    pub fn new(source: Arc<dyn InstanceSource>) -> Self {
        Self::with_balancer(source, Arc::new(RoundRobin::new()))
    }

    pub fn with_balancer(source: Arc<dyn InstanceSource>, balancer: Arc<dyn LoadBalancer>) -> Self {
        Self { source, balancer }
    }

    /// Select an instance of `service_name` (matched case-insensitively).
    pub async fn select(&self, service_name: &str) -> Result<InstanceView, SelectionError> {
        let service_name = canonical_service_name(service_name);
        let instances = self.source.healthy_instances(&service_name).await?;

        match self.balancer.next_instance(&service_name, &instances) {
            Some(instance) => Ok(instance),
            None => {
                tracing::debug!(service = %service_name, "No healthy instances registered");
                Err(SelectionError::NoHealthyInstance(service_name))
            }
        }
    }
}
