//! Named circuit breakers, created on first use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::{BreakerSettings, CircuitBreakerConfig};
use crate::resilience::circuit_breaker::{BreakerError, BreakerPolicy, BreakerSnapshot, CircuitBreaker};

/// Holds one breaker per dependency name for the process lifetime.
#[derive(Debug)]
pub struct BreakerRegistry {
    defaults: BreakerSettings,
    overrides: HashMap<String, BreakerSettings>,
    default_timeout: Duration,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn from_config(config: &CircuitBreakerConfig, default_timeout: Duration) -> Self {
        Self {
            defaults: config.defaults.clone(),
            overrides: config.instances.clone(),
            default_timeout,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `name`, created with its configured settings if new.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let settings = self.overrides.get(name).unwrap_or(&self.defaults);
                tracing::debug!(breaker = %name, ?settings, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, BreakerPolicy::new(settings, self.default_timeout)))
            })
            .value()
            .clone()
    }

    /// Run `call` under the breaker named `name`.
    pub async fn execute<F, Fut, T, E>(&self, name: &str, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.breaker(name).execute(call).await
    }

    /// Snapshots of every breaker created so far, by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Reset `name` to CLOSED. Returns `false` if no such breaker exists.
    pub fn reset(&self, name: &str) -> bool {
        let Some(breaker) = self.breakers.get(name).map(|b| Arc::clone(b.value())) else {
            return false;
        };
        breaker.reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    fn registry() -> BreakerRegistry {
        let mut config = CircuitBreakerConfig::default();
        config.instances.insert(
            "strict".into(),
            BreakerSettings {
                sliding_window_size: 1,
                min_calls: 1,
                ..BreakerSettings::default()
            },
        );
        BreakerRegistry::from_config(&config, Duration::from_secs(10))
    }

    #[test]
    fn test_breakers_are_shared_per_name() {
        let registry = registry();
        let a = registry.breaker("orders.updateStatus");
        let b = registry.breaker("orders.updateStatus");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.snapshots().len(), 1);
    }

    #[test]
    fn test_overrides_apply_by_name() {
        let registry = registry();
        assert_eq!(registry.breaker("strict").policy().window_size, 1);
        assert_eq!(registry.breaker("other").policy().window_size, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_independent() {
        let registry = registry();
        let result: Result<(), _> = registry.execute("strict", || async { Err("down") }).await;
        assert!(result.is_err());

        assert_eq!(registry.breaker("strict").state(), CircuitState::Open);
        assert_eq!(registry.breaker("other").state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let registry = registry();
        assert!(!registry.reset("strict"));

        let _: Result<(), _> = registry.execute("strict", || async { Err("down") }).await;
        assert!(registry.reset("strict"));
        assert_eq!(registry.breaker("strict").state(), CircuitState::Closed);
    }
}
