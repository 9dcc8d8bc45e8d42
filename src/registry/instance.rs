//! Service instance records and their wire views.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Identifier of a registered instance.
pub type InstanceId = String;

/// Lease status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    Up,
    Down,
}

/// Canonical form of a logical service name (lowercase, trimmed).
pub fn canonical_service_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// One running copy of a logical service, as held by the registry.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub instance_id: InstanceId,
    /// Always canonical (lowercase).
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub last_heartbeat_at: Instant,
    /// When the instance went DOWN, if it has.
    pub down_since: Option<Instant>,
    /// Registration order, used to keep round-robin stable.
    pub sequence: u64,
}

impl ServiceInstance {
    /// True once the lease has lapsed without renewal.
    pub fn is_expired(&self, now: Instant, lease_ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at) > lease_ttl
    }

    /// UP and within its lease.
    pub fn is_healthy(&self, now: Instant, lease_ttl: Duration) -> bool {
        self.status == InstanceStatus::Up && !self.is_expired(now, lease_ttl)
    }

    pub(crate) fn mark_down(&mut self, now: Instant) {
        if self.status == InstanceStatus::Up {
            self.status = InstanceStatus::Down;
            self.down_since = Some(now);
        }
    }

    /// Read-model view relative to `now`.
    pub fn view(&self, now: Instant, lease_ttl: Duration) -> InstanceView {
        let age = now.saturating_duration_since(self.last_heartbeat_at);
        InstanceView {
            instance_id: self.instance_id.clone(),
            service_name: self.service_name.clone(),
            host: self.host.clone(),
            port: self.port,
            status: self.status,
            last_heartbeat_ago_ms: duration_ms(age),
            lease_remaining_ms: duration_ms(lease_ttl.saturating_sub(age)),
        }
    }
}

/// Snapshot of an instance handed to selectors and returned by the discovery query.
///
/// Carries the remaining lease rather than an absolute timestamp, since
/// monotonic instants mean nothing outside the registry process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub instance_id: InstanceId,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub last_heartbeat_ago_ms: u64,
    pub lease_remaining_ms: u64,
}

impl InstanceView {
    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Registration request body. Every field is optional on the wire so that
/// missing values surface as `InvalidRegistration` instead of a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl Registration {
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            instance_id: None,
            service_name: Some(service_name.into()),
            host: Some(host.into()),
            port: Some(port),
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<InstanceId>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }
}

/// Body of heartbeat and deregister calls, and of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub instance_id: InstanceId,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
