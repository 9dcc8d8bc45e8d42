//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a node.
//! All types derive Serde traits for deserialization from config files.
//! A node hosts any combination of the registry, the gateway and the
//! payment service, switched on per section.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a discovery-gateway node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Service registry settings (leases, sweep).
    pub registry: RegistryConfig,

    /// Where selectors look up instances.
    pub discovery: DiscoveryConfig,

    /// Gateway ingress settings.
    pub gateway: GatewayConfig,

    /// Timeout configuration for outbound calls.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker defaults and per-dependency overrides.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Payment confirmation service.
    pub payments: PaymentConfig,

    /// Self-registration of this node with a registry.
    pub registration: RegistrationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl NodeConfig {
    /// Names of the roles this node serves, for logs and the admin API.
    pub fn roles(&self) -> Vec<&'static str> {
        let mut roles = Vec::new();
        if self.registry.enabled {
            roles.push("registry");
        }
        if self.gateway.enabled {
            roles.push("gateway");
        }
        if self.payments.enabled {
            roles.push("payments");
        }
        if self.admin.enabled {
            roles.push("admin");
        }
        roles
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8761").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8761".to_string(),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Serve the registration protocol and discovery query on this node.
    pub enabled: bool,

    /// Lease lifetime; an instance without a heartbeat for longer is expired.
    pub lease_ttl_secs: u64,

    /// Interval of the active expiry sweep.
    pub sweep_interval_secs: u64,

    /// How long DOWN records stay visible before being purged.
    pub down_retention_secs: u64,
}

impl RegistryConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn down_retention(&self) -> Duration {
        Duration::from_secs(self.down_retention_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lease_ttl_secs: 30,
            sweep_interval_secs: 10,
            down_retention_secs: 10,
        }
    }
}

/// Discovery client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Base URL of a remote registry. When unset, the node's own registry is used.
    pub registry_url: Option<String>,

    /// How long a fetched instance list is reused before asking the registry again.
    pub cache_ttl_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            cache_ttl_ms: 5_000,
        }
    }
}

impl DiscoveryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Gateway ingress configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Route `/{serviceName}/{rest...}` to registered instances.
    pub enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Total time allowed for an upstream to produce a response, in milliseconds.
    pub request_ms: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            request_ms: 10_000,
        }
    }
}

/// Settings of a single circuit breaker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Number of most recent outcomes kept in the sliding window.
    pub sliding_window_size: usize,

    /// Outcomes required in the window before the failure rate is evaluated.
    pub min_calls: usize,

    /// Failure percentage (0-100] at which the breaker opens.
    pub failure_rate_threshold: f64,

    /// Time spent OPEN before a probe is admitted.
    pub open_state_duration_secs: u64,

    /// Concurrent probes admitted while HALF_OPEN.
    pub half_open_permits: u32,

    /// Per-call timeout in milliseconds. Falls back to `timeouts.request_ms`.
    pub call_timeout_ms: Option<u64>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            sliding_window_size: 3,
            min_calls: 2,
            failure_rate_threshold: 50.0,
            open_state_duration_secs: 50,
            half_open_permits: 1,
            call_timeout_ms: None,
        }
    }
}

/// Circuit breaker configuration.
///
/// ```toml
/// [circuit_breaker]
/// sliding_window_size = 3
///
/// [circuit_breaker.instances."orders.updateStatus"]
/// open_state_duration_secs = 20
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Settings used by every breaker without an override.
    #[serde(flatten)]
    pub defaults: BreakerSettings,

    /// Per-dependency overrides keyed by breaker name.
    pub instances: HashMap<String, BreakerSettings>,
}

/// Payment service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Serve the payment confirmation endpoint on this node.
    pub enabled: bool,

    /// Logical name of the order service in the registry.
    pub order_service: String,

    /// Path prefix of the order resource on the order service.
    pub order_path_prefix: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            order_service: "pedidos".to_string(),
            order_path_prefix: "/pedidos".to_string(),
        }
    }
}

/// Self-registration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Register this node with a registry and keep its lease alive.
    pub enabled: bool,

    /// Registry base URL (e.g., "http://registry:8761").
    pub registry_url: String,

    /// Logical service name to register under.
    pub service_name: String,

    /// Host other services should use to reach this node.
    pub host: String,

    /// Port other services should use to reach this node.
    pub port: u16,

    /// Stable instance ID. Generated at startup when unset.
    pub instance_id: Option<String>,

    /// Interval between heartbeats.
    pub heartbeat_interval_secs: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            registry_url: "http://localhost:8761".to_string(),
            service_name: String::new(),
            host: "127.0.0.1".to_string(),
            port: 0,
            instance_id: None,
            heartbeat_interval_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
