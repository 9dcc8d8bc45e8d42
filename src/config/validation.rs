//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every role can reach a registry
//! - Validate value ranges (timeouts > 0, breaker bounds, lease vs sweep)
//! - Detect conflicting roles on one node
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{BreakerSettings, NodeConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let registry = &config.registry;
    if registry.lease_ttl_secs == 0 {
        errors.push(ValidationError::new("registry.lease_ttl_secs", "must be greater than 0"));
    }
    if registry.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("registry.sweep_interval_secs", "must be greater than 0"));
    } else if registry.sweep_interval_secs >= registry.lease_ttl_secs {
        errors.push(ValidationError::new(
            "registry.sweep_interval_secs",
            "must be shorter than registry.lease_ttl_secs",
        ));
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than 0"));
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than 0"));
    }

    validate_breaker("circuit_breaker", &config.circuit_breaker.defaults, &mut errors);
    for (name, settings) in &config.circuit_breaker.instances {
        validate_breaker(&format!("circuit_breaker.instances.{}", name), settings, &mut errors);
    }

    match &config.discovery.registry_url {
        Some(url) => {
            if Url::parse(url).is_err() {
                errors.push(ValidationError::new(
                    "discovery.registry_url",
                    format!("'{}' is not a valid URL", url),
                ));
            }
        }
        None => {
            let needs_discovery = config.gateway.enabled || config.payments.enabled;
            if needs_discovery && !config.registry.enabled {
                errors.push(ValidationError::new(
                    "discovery.registry_url",
                    "required when the local registry is disabled",
                ));
            }
        }
    }

    // The gateway owns every path it does not recognise, payments included.
    if config.gateway.enabled && config.payments.enabled {
        errors.push(ValidationError::new(
            "payments.enabled",
            "payments and gateway cannot share a node",
        ));
    }

    if config.payments.enabled {
        if config.payments.order_service.trim().is_empty() {
            errors.push(ValidationError::new("payments.order_service", "must not be empty"));
        }
        if !config.payments.order_path_prefix.starts_with('/') {
            errors.push(ValidationError::new("payments.order_path_prefix", "must start with '/'"));
        }
    }

    let registration = &config.registration;
    if registration.enabled {
        if Url::parse(&registration.registry_url).is_err() {
            errors.push(ValidationError::new(
                "registration.registry_url",
                format!("'{}' is not a valid URL", registration.registry_url),
            ));
        }
        if registration.service_name.trim().is_empty() {
            errors.push(ValidationError::new("registration.service_name", "must not be empty"));
        }
        if registration.host.trim().is_empty() {
            errors.push(ValidationError::new("registration.host", "must not be empty"));
        }
        if registration.port == 0 {
            errors.push(ValidationError::new("registration.port", "must be greater than 0"));
        }
        if registration.heartbeat_interval_secs == 0 {
            errors.push(ValidationError::new(
                "registration.heartbeat_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty when admin is enabled"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, settings: &BreakerSettings, errors: &mut Vec<ValidationError>) {
    if settings.sliding_window_size == 0 {
        errors.push(ValidationError::new(
            format!("{}.sliding_window_size", prefix),
            "must be greater than 0",
        ));
    }
    if settings.min_calls == 0 || settings.min_calls > settings.sliding_window_size {
        errors.push(ValidationError::new(
            format!("{}.min_calls", prefix),
            "must be between 1 and sliding_window_size",
        ));
    }
    if !(settings.failure_rate_threshold > 0.0 && settings.failure_rate_threshold <= 100.0) {
        errors.push(ValidationError::new(
            format!("{}.failure_rate_threshold", prefix),
            "must be in (0, 100]",
        ));
    }
    if settings.open_state_duration_secs == 0 {
        errors.push(ValidationError::new(
            format!("{}.open_state_duration_secs", prefix),
            "must be greater than 0",
        ));
    }
    if settings.half_open_permits == 0 {
        errors.push(ValidationError::new(
            format!("{}.half_open_permits", prefix),
            "must be at least 1",
        ));
    }
    if settings.call_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            format!("{}.call_timeout_ms", prefix),
            "must be greater than 0",
        ));
    }
}
