//! Instance-side registration protocol client.
//!
//! # Responsibilities
//! - Register this node with a registry on startup (retrying with backoff)
//! - Keep the lease alive with periodic heartbeats
//! - Re-register when the registry no longer knows the instance
//! - Deregister on shutdown

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use url::Url;
use uuid::Uuid;

use crate::config::RegistrationConfig;
use crate::registry::instance::{InstanceId, InstanceRef, Registration};
use crate::resilience::backoff::Backoff;

const REGISTRATION_BACKOFF: Backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));

/// Errors talking to the registry.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid registry URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("registry rejected registration: {0}")]
    Rejected(String),

    /// The registry forgot this instance; it must register again.
    #[error("instance not known to the registry")]
    NotFound,

    #[error("registry answered with status {0}")]
    Status(StatusCode),
}

/// Keeps one instance registered for as long as it runs.
pub struct RegistrationAgent {
    client: reqwest::Client,
    registry_url: Url,
    registration: Registration,
    instance_id: InstanceId,
    heartbeat_interval: Duration,
}

impl RegistrationAgent {
    /// Build an agent from configuration. The instance ID is fixed for the
    /// agent's lifetime, generated when not configured.
    pub fn new(config: &RegistrationConfig, request_timeout: Duration) -> Result<Self, AgentError> {
        let registry_url = Url::parse(&config.registry_url)?;
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", config.service_name, Uuid::new_v4()));
        let registration = Registration::new(&config.service_name, &config.host, config.port)
            .with_instance_id(instance_id.clone());
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            registry_url,
            registration,
            instance_id,
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Send one registration.
    pub async fn register(&self) -> Result<InstanceId, AgentError> {
        let res = self
            .client
            .post(self.registry_url.join("registry/register")?)
            .json(&self.registration)
            .send()
            .await?;

        match res.status() {
            s if s.is_success() => Ok(res.json::<InstanceRef>().await?.instance_id),
            StatusCode::BAD_REQUEST => Err(AgentError::Rejected(res.text().await.unwrap_or_default())),
            s => Err(AgentError::Status(s)),
        }
    }

    /// Send one heartbeat.
    pub async fn heartbeat(&self) -> Result<(), AgentError> {
        let res = self
            .client
            .post(self.registry_url.join("registry/heartbeat")?)
            .json(&self.instance_ref())
            .send()
            .await?;

        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(AgentError::NotFound),
            s => Err(AgentError::Status(s)),
        }
    }

    /// Remove this instance from the registry.
    pub async fn deregister(&self) -> Result<(), AgentError> {
        let res = self
            .client
            .post(self.registry_url.join("registry/deregister")?)
            .json(&self.instance_ref())
            .send()
            .await?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(AgentError::Status(res.status()))
        }
    }

    fn instance_ref(&self) -> InstanceRef {
        InstanceRef {
            instance_id: self.instance_id.clone(),
        }
    }

    /// Register, retrying with backoff until it sticks. Returns `false` if
    /// shutdown arrived first or the registry refused the registration.
    async fn register_until_accepted(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let mut attempt = 0;
        loop {
            match self.register().await {
                Ok(id) => {
                    tracing::info!(instance_id = %id, registry = %self.registry_url, "Registered with registry");
                    return true;
                }
                // A rejected registration fails the same way every time.
                Err(AgentError::Rejected(reason)) => {
                    tracing::error!(
                        instance_id = %self.instance_id,
                        registry = %self.registry_url,
                        reason = %reason,
                        "Registry rejected registration, self-registration stopped"
                    );
                    return false;
                }
                Err(e) => {
                    attempt += 1;
                    let delay = REGISTRATION_BACKOFF.delay(attempt);
                    tracing::warn!(error = %e, attempt, delay = ?delay, "Registration failed, retrying");
                    tokio::select! {
                        _ = time::sleep(delay) => {}
                        _ = shutdown.recv() => return false,
                    }
                }
            }
        }
    }

    /// Register, heartbeat until shutdown, then deregister.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.register_until_accepted(&mut shutdown).await {
            return;
        }

        let mut ticker = time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.heartbeat().await {
                        Ok(()) => tracing::trace!(instance_id = %self.instance_id, "Heartbeat sent"),
                        Err(AgentError::NotFound) => {
                            tracing::warn!(instance_id = %self.instance_id, "Registry lost this instance, re-registering");
                            if !self.register_until_accepted(&mut shutdown).await {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!(instance_id = %self.instance_id, error = %e, "Heartbeat failed"),
                    }
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        match self.deregister().await {
            Ok(()) => tracing::info!(instance_id = %self.instance_id, "Deregistered from registry"),
            Err(e) => tracing::warn!(instance_id = %self.instance_id, error = %e, "Deregistration failed"),
        }
    }
}
