//! Active lease expiry.
//!
//! # Responsibilities
//! - Periodically sweep the registry for lapsed leases
//! - Mark them DOWN, then purge after the retention period
//!
//! Lease renewal itself is `RegistryStore::heartbeat`; this task is the
//! active half of expiry. Reads already filter lapsed leases, so a late
//! sweep only delays memory reclamation and the expiry log line.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::RegistryConfig;
use crate::registry::store::{RegistryStore, SweepReport};

/// Background task expiring instances that stopped sending heartbeats.
pub struct HeartbeatProcessor {
    store: Arc<RegistryStore>,
    interval: Duration,
}

impl HeartbeatProcessor {
    pub fn new(store: Arc<RegistryStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            interval: config.sweep_interval(),
        }
    }

    /// Run one sweep. A panic inside the sweep is logged and swallowed.
    pub fn sweep_once(&self) -> Option<SweepReport> {
        match catch_unwind(AssertUnwindSafe(|| self.store.sweep())) {
            Ok(report) => {
                if !report.expired.is_empty() || !report.purged.is_empty() {
                    tracing::info!(
                        expired = report.expired.len(),
                        purged = report.purged.len(),
                        remaining = self.store.len(),
                        "Registry sweep finished"
                    );
                }
                Some(report)
            }
            Err(_) => {
                tracing::error!("Registry sweep panicked, will retry on next tick");
                None
            }
        }
    }

    /// Sweep every interval until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            lease_ttl_secs = self.store.lease_ttl().as_secs(),
            "Heartbeat processor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat processor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::instance::Registration;
    use tokio::time::advance;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            lease_ttl_secs: 30,
            sweep_interval_secs: 10,
            down_retention_secs: 10,
            ..RegistryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_purges_dead_instances() {
        let config = config();
        let store = Arc::new(RegistryStore::from_config(&config));
        store
            .register(Registration::new("pedidos", "127.0.0.1", 9000))
            .unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(HeartbeatProcessor::new(store.clone(), &config).run(rx));
        settle().await;

        // Lease lapses at 30s; the late tick at 41s marks it DOWN.
        advance(Duration::from_secs(41)).await;
        settle().await;
        assert_eq!(store.len(), 1);
        assert!(store.list_healthy("pedidos").is_empty());

        // Next tick comes one interval later and purges it.
        advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(store.is_empty());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_once_reports() {
        let config = config();
        let store = Arc::new(RegistryStore::from_config(&config));
        let id = store
            .register(Registration::new("pedidos", "127.0.0.1", 9000))
            .unwrap();
        let processor = HeartbeatProcessor::new(store.clone(), &config);

        assert_eq!(processor.sweep_once(), Some(SweepReport::default()));

        advance(Duration::from_secs(31)).await;
        let report = processor.sweep_once().unwrap();
        assert_eq!(report.expired, vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let config = config();
        let store = Arc::new(RegistryStore::from_config(&config));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(HeartbeatProcessor::new(store, &config).run(rx));

        settle().await;
        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("processor did not stop")
            .unwrap();
    }
}
