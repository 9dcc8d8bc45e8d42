//! In-memory registry of service instances with lease expiry.
//!
//! # Responsibilities
//! - Register, renew, and remove instances
//! - Answer "which instances of X are alive right now"
//! - Mark expired leases DOWN and purge them (driven by the sweeper)
//!
//! # Design Decisions
//! - One `DashMap` entry per instance ID; every operation locks only the
//!   shard holding that record, never the whole table
//! - Reads re-check the lease at call time, so a delayed sweep never
//!   exposes an expired instance
//! - Lease settings are atomics so a config reload applies without a lock

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::observability::metrics;
use crate::registry::instance::{
    canonical_service_name, InstanceId, InstanceStatus, InstanceView, Registration, ServiceInstance,
};

/// Errors returned by registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registration is missing a service name, host, or port.
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// The instance is unknown or its lease already expired; it must re-register.
    #[error("instance '{0}' not found")]
    NotFound(InstanceId),
}

/// What one sweep changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Instances whose lease lapsed during this sweep (now DOWN).
    pub expired: Vec<InstanceId>,
    /// DOWN instances removed after their retention period.
    pub purged: Vec<InstanceId>,
}

/// The authoritative instance table.
#[derive(Debug)]
pub struct RegistryStore {
    instances: DashMap<InstanceId, ServiceInstance>,
    next_sequence: AtomicU64,
    lease_ttl_ms: AtomicU64,
    down_retention_ms: AtomicU64,
}

impl RegistryStore {
    /// Create an empty store.
    pub fn new(lease_ttl: Duration, down_retention: Duration) -> Self {
        Self {
            instances: DashMap::new(),
            next_sequence: AtomicU64::new(0),
            lease_ttl_ms: AtomicU64::new(millis(lease_ttl)),
            down_retention_ms: AtomicU64::new(millis(down_retention)),
        }
    }

    /// Create an empty store from registry configuration.
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.lease_ttl(), config.down_retention())
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms.load(Ordering::Relaxed))
    }

    pub fn down_retention(&self) -> Duration {
        Duration::from_millis(self.down_retention_ms.load(Ordering::Relaxed))
    }

    /// Apply reloaded lease settings.
    pub fn update_settings(&self, config: &RegistryConfig) {
        self.lease_ttl_ms.store(millis(config.lease_ttl()), Ordering::Relaxed);
        self.down_retention_ms
            .store(millis(config.down_retention()), Ordering::Relaxed);
    }

    /// Register an instance, or refresh it when the ID is already known.
    ///
    /// Re-registering keeps the original registration order but updates the
    /// address, revives a DOWN record, and restarts the lease.
    pub fn register(&self, registration: Registration) -> Result<InstanceId, RegistryError> {
        let service_name = registration
            .service_name
            .as_deref()
            .map(canonical_service_name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RegistryError::InvalidRegistration("serviceName is required".into()))?;
        let host = registration
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RegistryError::InvalidRegistration("host is required".into()))?;
        let port = registration
            .port
            .filter(|p| *p != 0)
            .ok_or_else(|| RegistryError::InvalidRegistration("port is required".into()))?;

        let instance_id = registration
            .instance_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Instant::now();
        match self.instances.entry(instance_id.clone()) {
            Entry::Occupied(mut entry) => {
                let inst = entry.get_mut();
                inst.service_name = service_name.clone();
                inst.host = host;
                inst.port = port;
                inst.status = InstanceStatus::Up;
                inst.down_since = None;
                inst.last_heartbeat_at = now;
                tracing::info!(instance_id = %instance_id, service = %service_name, "Instance re-registered");
            }
            Entry::Vacant(entry) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    instance_id = %instance_id,
                    service = %service_name,
                    host = %host,
                    port,
                    "Instance registered"
                );
                entry.insert(ServiceInstance {
                    instance_id: instance_id.clone(),
                    service_name: service_name.clone(),
                    host,
                    port,
                    status: InstanceStatus::Up,
                    last_heartbeat_at: now,
                    down_since: None,
                    sequence,
                });
            }
        }

        metrics::record_registry_event("register", &service_name);
        metrics::record_registry_size(self.instances.len());
        Ok(instance_id)
    }

    /// Renew the lease of `instance_id`.
    ///
    /// A lease that has already lapsed is not revived: the record is marked
    /// DOWN and the caller gets `NotFound`, telling it to register again.
    pub fn heartbeat(&self, instance_id: &str) -> Result<(), RegistryError> {
        let now = Instant::now();
        let lease_ttl = self.lease_ttl();

        let mut inst = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| RegistryError::NotFound(instance_id.to_string()))?;

        if inst.status == InstanceStatus::Down || inst.is_expired(now, lease_ttl) {
            inst.mark_down(now);
            tracing::debug!(instance_id = %instance_id, "Heartbeat after lease expiry");
            return Err(RegistryError::NotFound(instance_id.to_string()));
        }

        inst.last_heartbeat_at = now;
        metrics::record_registry_event("heartbeat", &inst.service_name);
        Ok(())
    }

    /// Remove an instance immediately. Unknown IDs are not an error.
    ///
    /// Returns whether a record was removed.
    pub fn deregister(&self, instance_id: &str) -> bool {
        match self.instances.remove(instance_id) {
            Some((_, inst)) => {
                tracing::info!(instance_id = %instance_id, service = %inst.service_name, "Instance deregistered");
                metrics::record_registry_event("deregister", &inst.service_name);
                metrics::record_registry_size(self.instances.len());
                true
            }
            None => false,
        }
    }

    /// Instances of `service_name` that are UP and within their lease right
    /// now, in registration order.
    pub fn list_healthy(&self, service_name: &str) -> Vec<ServiceInstance> {
        let service_name = canonical_service_name(service_name);
        let now = Instant::now();
        let lease_ttl = self.lease_ttl();

        let mut healthy: Vec<ServiceInstance> = self
            .instances
            .iter()
            .filter(|r| r.service_name == service_name && r.is_healthy(now, lease_ttl))
            .map(|r| r.value().clone())
            .collect();
        healthy.sort_by_key(|i| i.sequence);
        healthy
    }

    /// `list_healthy` as wire views.
    pub fn healthy_views(&self, service_name: &str) -> Vec<InstanceView> {
        let now = Instant::now();
        let lease_ttl = self.lease_ttl();
        self.list_healthy(service_name)
            .iter()
            .map(|i| i.view(now, lease_ttl))
            .collect()
    }

    /// Every record, DOWN ones included, in registration order.
    pub fn list_all(&self) -> Vec<InstanceView> {
        let now = Instant::now();
        let lease_ttl = self.lease_ttl();

        let mut all: Vec<(u64, InstanceView)> = self
            .instances
            .iter()
            .map(|r| (r.sequence, r.view(now, lease_ttl)))
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, v)| v).collect()
    }

    /// Healthy instance count per service name.
    pub fn services(&self) -> BTreeMap<String, usize> {
        let now = Instant::now();
        let lease_ttl = self.lease_ttl();

        let mut services = BTreeMap::new();
        for r in self.instances.iter() {
            let count = services.entry(r.service_name.clone()).or_insert(0);
            if r.is_healthy(now, lease_ttl) {
                *count += 1;
            }
        }
        services
    }

    /// Total number of records, DOWN ones included.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Expire lapsed leases and purge DOWN records past their retention.
    ///
    /// Each record is re-checked under its own entry lock, so a heartbeat
    /// that lands between the scan and the update wins.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let lease_ttl = self.lease_ttl();
        let retention = self.down_retention();

        // Collect first: holding an iterator guard while taking a write
        // lock on the same shard would deadlock.
        let candidates: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|r| r.status == InstanceStatus::Down || r.is_expired(now, lease_ttl))
            .map(|r| r.key().clone())
            .collect();

        let mut report = SweepReport::default();
        for id in candidates {
            if let Some(mut inst) = self.instances.get_mut(&id) {
                if inst.status == InstanceStatus::Up && inst.is_expired(now, lease_ttl) {
                    inst.mark_down(now);
                    tracing::warn!(
                        instance_id = %id,
                        service = %inst.service_name,
                        "Lease expired, instance marked DOWN"
                    );
                    metrics::record_registry_event("expire", &inst.service_name);
                    report.expired.push(id.clone());
                }
            }

            let purged = self.instances.remove_if(&id, |_, inst| {
                inst.status == InstanceStatus::Down
                    && inst
                        .down_since
                        .is_some_and(|since| now.saturating_duration_since(since) >= retention)
            });
            if let Some((_, inst)) = purged {
                tracing::info!(instance_id = %id, service = %inst.service_name, "DOWN instance purged");
                metrics::record_registry_event("purge", &inst.service_name);
                report.purged.push(id);
            }
        }

        if !report.expired.is_empty() || !report.purged.is_empty() {
            metrics::record_registry_size(self.instances.len());
        }
        report
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
