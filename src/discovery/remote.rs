//! Discovery against a registry in another process.
//!
//! # Responsibilities
//! - Query `GET /registry/instances?serviceName=X`
//! - Cache answers per service for a short time
//! - Drop cached instances as their transmitted lease runs out
//!
//! # Design Decisions
//! - The cache is keyed per service name; lookups for different services
//!   never contend
//! - Names that resolve to no live instance are never cached
//! - When the registry is unreachable the lease-filtered cache is served,
//!   so a registry blip does not take routing down with it

use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use url::Url;

use crate::discovery::{DiscoveryError, InstanceSource};
use crate::registry::{canonical_service_name, InstanceView};

#[derive(Debug, Clone)]
struct CachedInstances {
    fetched_at: Instant,
    instances: Vec<InstanceView>,
}

impl CachedInstances {
    /// Instances whose lease, as reported at fetch time, has not run out yet.
    fn live(&self, now: Instant) -> Vec<InstanceView> {
        let elapsed = now.saturating_duration_since(self.fetched_at);
        self.instances
            .iter()
            .filter(|i| Duration::from_millis(i.lease_remaining_ms) > elapsed)
            .cloned()
            .collect()
    }
}

/// HTTP client for a remote registry's discovery query.
#[derive(Debug)]
pub struct RemoteRegistry {
    client: reqwest::Client,
    base_url: Url,
    cache_ttl: Duration,
    cache: DashMap<String, CachedInstances>,
}

impl RemoteRegistry {
    pub fn new(
        base_url: Url,
        cache_ttl: Duration,
        request_timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DiscoveryError::RegistryUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            cache_ttl,
            cache: DashMap::new(),
        })
    }

    async fn fetch(&self, service_name: &str) -> Result<Vec<InstanceView>, DiscoveryError> {
        let url = self
            .base_url
            .join("registry/instances")
            .map_err(|e| DiscoveryError::RegistryUnavailable(e.to_string()))?;

        let res = self
            .client
            .get(url)
            .query(&[("serviceName", service_name)])
            .send()
            .await
            .map_err(|e| DiscoveryError::RegistryUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(DiscoveryError::RegistryStatus(res.status().as_u16()));
        }

        res.json::<Vec<InstanceView>>()
            .await
            .map_err(|e| DiscoveryError::RegistryUnavailable(e.to_string()))
    }

    async fn lookup(&self, service_name: &str) -> Result<Vec<InstanceView>, DiscoveryError> {
        let service_name = canonical_service_name(service_name);
        let now = Instant::now();

        if let Some(cached) = self.cache.get(&service_name) {
            if now.saturating_duration_since(cached.fetched_at) < self.cache_ttl {
                return Ok(cached.live(now));
            }
        }

        match self.fetch(&service_name).await {
            Ok(instances) => {
                let fetched_at = Instant::now();
                let cached = CachedInstances {
                    fetched_at,
                    instances,
                };
                let live = cached.live(fetched_at);
                self.evict_lapsed(fetched_at);
                if live.is_empty() {
                    self.cache.remove(&service_name);
                } else {
                    self.cache.insert(service_name, cached);
                }
                Ok(live)
            }
            Err(e) => {
                let stale = self
                    .cache
                    .get(&service_name)
                    .map(|cached| cached.live(Instant::now()))
                    .unwrap_or_default();
                if stale.is_empty() {
                    self.cache.remove(&service_name);
                    Err(e)
                } else {
                    tracing::warn!(
                        service = %service_name,
                        error = %e,
                        cached = stale.len(),
                        "Registry unreachable, serving cached instances"
                    );
                    Ok(stale)
                }
            }
        }
    }
}

impl RemoteRegistry {
    /// Drop entries none of whose instances are still within their lease.
    /// Only names that resolved to live instances stay cached.
    fn evict_lapsed(&self, now: Instant) {
        self.cache.retain(|_, cached| {
            let elapsed = now.saturating_duration_since(cached.fetched_at);
            cached
                .instances
                .iter()
                .any(|i| Duration::from_millis(i.lease_remaining_ms) > elapsed)
        });
    }
}

impl InstanceSource for RemoteRegistry {
    fn healthy_instances<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceView>, DiscoveryError>> {
        self.lookup(service_name).boxed()
    }
}
