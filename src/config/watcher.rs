//! Configuration file watcher for hot reload.
//!
//! A node is assembled once from its roles, listener and discovery source,
//! so those settings are pinned at startup. A reload that changes any of
//! them is refused here and never reaches the server; everything else
//! (lease settings, admin key, ...) is forwarded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::NodeConfig;

/// Settings that only take effect on restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedSettings {
    roles: Vec<&'static str>,
    bind_address: String,
    registry_url: Option<String>,
}

impl PinnedSettings {
    pub fn of(config: &NodeConfig) -> Self {
        Self {
            roles: config.roles(),
            bind_address: config.listener.bind_address.clone(),
            registry_url: config.discovery.registry_url.clone(),
        }
    }

    /// Fields of `next` that differ from the pinned values.
    pub fn changed_fields(&self, next: &NodeConfig) -> Vec<&'static str> {
        let next = Self::of(next);
        let mut changed = Vec::new();
        if self.roles != next.roles {
            changed.push("roles");
        }
        if self.bind_address != next.bind_address {
            changed.push("listener.bind_address");
        }
        if self.registry_url != next.registry_url {
            changed.push("discovery.registry_url");
        }
        changed
    }
}

/// Watches the node's config file and forwards reloadable changes.
pub struct ConfigWatcher {
    path: PathBuf,
    pinned: PinnedSettings,
    update_tx: mpsc::UnboundedSender<NodeConfig>,
}

impl ConfigWatcher {
    /// Watch `path` for a node started with `running`.
    ///
    /// Returns the watcher and a receiver for accepted configurations.
    pub fn new(path: &Path, running: &NodeConfig) -> (Self, mpsc::UnboundedReceiver<NodeConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                pinned: PinnedSettings::of(running),
                update_tx,
            },
            update_rx,
        )
    }

    /// Load the file and forward it if it is valid and reloadable.
    /// Returns whether a configuration was forwarded.
    pub fn reload(&self) -> bool {
        let next = match load_config(&self.path) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to reload config, keeping current configuration");
                return false;
            }
        };

        let changed = self.pinned.changed_fields(&next);
        if !changed.is_empty() {
            tracing::warn!(path = ?self.path, changed = ?changed, "Config reload refused, these settings need a restart");
            return false;
        }

        if self.update_tx.send(next).is_err() {
            tracing::debug!("Config receiver dropped, ignoring reload");
            return false;
        }
        true
    }

    /// Start watching the file. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?self.path, "Config file change detected, reloading");
                    self.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
