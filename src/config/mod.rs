//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NodeConfig (validated, immutable)
//!     → Arc<ArcSwap<NodeConfig>> held by the server
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<NodeConfig>
//!     → registry picks up new lease settings
//! ```
//!
//! # Design Decisions
//! - A loaded `NodeConfig` is never mutated; a reload swaps in a new one
//! - Every section defaults, so an empty file runs registry plus gateway
//! - serde rejects malformed input; validation.rs reports every semantic
//!   problem at once
//! - Only registry lease settings apply live; the rest needs a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BreakerSettings, CircuitBreakerConfig, DiscoveryConfig, GatewayConfig,
    ListenerConfig, NodeConfig, ObservabilityConfig, PaymentConfig, RegistrationConfig,
    RegistryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
