//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the subsystems the configured roles need
//! - Assemble the Axum router from each role's sub-router
//! - Wire up middleware (request ID, tracing, timeout)
//! - Run the heartbeat processor and the config reload loop
//! - Serve until the shutdown broadcast, draining in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::{Json, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::NodeConfig;
use crate::discovery::{DiscoveryError, InstanceSource, RemoteRegistry};
use crate::http::request::request_id;
use crate::http::{gateway, payments, registry};
use crate::load_balancer::InstanceSelector;
use crate::net::{HttpTransport, Transport};
use crate::payments::{InMemoryPayments, OrderServiceClient, PaymentConfirmation};
use crate::registry::{HeartbeatProcessor, RegistryStore};
use crate::resilience::BreakerRegistry;
use crate::routing::Router as ServiceRouter;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid registry URL: {0}")]
    RegistryUrl(#[from] url::ParseError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("role '{0}' needs a registry: enable the local one or set discovery.registry_url")]
    NoInstanceSource(&'static str),
}

/// HTTP node serving the roles enabled in its configuration.
pub struct HttpServer {
    router: Router,
    config: Arc<ArcSwap<NodeConfig>>,
    store: Option<Arc<RegistryStore>>,
    breakers: Arc<BreakerRegistry>,
    ledger: Arc<InMemoryPayments>,
}

impl HttpServer {
    /// Create a node from a validated configuration.
    pub fn new(config: NodeConfig) -> Result<Self, ServerError> {
        let store = config
            .registry
            .enabled
            .then(|| Arc::new(RegistryStore::from_config(&config.registry)));

        let source: Option<Arc<dyn InstanceSource>> = match (&config.discovery.registry_url, &store) {
            (Some(url), _) => Some(Arc::new(RemoteRegistry::new(
                Url::parse(url)?,
                config.discovery.cache_ttl(),
                config.timeouts.request(),
            )?)),
            (None, Some(store)) => Some(store.clone()),
            (None, None) => None,
        };

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.timeouts));
        let breakers = Arc::new(BreakerRegistry::from_config(
            &config.circuit_breaker,
            config.timeouts.request(),
        ));
        let ledger = Arc::new(InMemoryPayments::new());
        let config = Arc::new(ArcSwap::from_pointee(config));

        let router = Self::build_router(&config, store.clone(), source, transport, breakers.clone(), ledger.clone())?;

        Ok(Self {
            router,
            config,
            store,
            breakers,
            ledger,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &Arc<ArcSwap<NodeConfig>>,
        store: Option<Arc<RegistryStore>>,
        source: Option<Arc<dyn InstanceSource>>,
        transport: Arc<dyn Transport>,
        breakers: Arc<BreakerRegistry>,
        ledger: Arc<InMemoryPayments>,
    ) -> Result<Router, ServerError> {
        let current = config.load_full();
        let selector = |role: &'static str| {
            source
                .clone()
                .map(InstanceSelector::new)
                .ok_or(ServerError::NoInstanceSource(role))
        };

        let mut app = Router::new().route("/health", get(health));

        if let Some(store) = &store {
            app = app.merge(registry::router(store.clone()));
        }

        if current.payments.enabled {
            let orders = OrderServiceClient::new(selector("payments")?, transport.clone(), &current.payments);
            let confirmation = PaymentConfirmation::new(ledger, Arc::new(orders), breakers.clone());
            app = app.merge(payments::router(Arc::new(confirmation)));
        }

        if current.admin.enabled {
            app = app.merge(setup_admin_router(AdminState {
                store,
                breakers,
                config: config.clone(),
                started_at: Instant::now(),
            }));
        }

        // Last: the gateway claims every path nothing above matched.
        if current.gateway.enabled {
            let gateway = ServiceRouter::new(selector("gateway")?, transport);
            app = app.merge(gateway::router(Arc::new(gateway)));
        }

        // The upstream deadline fires first, so a slow instance is a 502.
        let server_timeout = current.timeouts.request() + current.timeouts.connect() + Duration::from_secs(1);

        Ok(app
            .layer(TimeoutLayer::new(server_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid)))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<NodeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let config = self.config.load_full();
        tracing::info!(address = %addr, roles = ?config.roles(), "HTTP server starting");

        if let Some(store) = &self.store {
            let processor = HeartbeatProcessor::new(store.clone(), &config.registry);
            tokio::spawn(processor.run(shutdown.resubscribe()));
        }

        tokio::spawn(reload_config(
            self.config.clone(),
            self.store.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The current configuration.
    pub fn config(&self) -> Arc<NodeConfig> {
        self.config.load_full()
    }

    /// The local registry, when this node runs one.
    pub fn registry(&self) -> Option<Arc<RegistryStore>> {
        self.store.clone()
    }

    pub fn breakers(&self) -> Arc<BreakerRegistry> {
        self.breakers.clone()
    }

    /// Payments known to this node's confirmation endpoint.
    pub fn payments_ledger(&self) -> Arc<InMemoryPayments> {
        self.ledger.clone()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}

/// Apply reloaded configurations until shutdown.
async fn reload_config(
    config: Arc<ArcSwap<NodeConfig>>,
    store: Option<Arc<RegistryStore>>,
    mut updates: mpsc::UnboundedReceiver<NodeConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            Some(next) = updates.recv() => {
                if let Some(store) = &store {
                    store.update_settings(&next.registry);
                }
                tracing::info!(
                    lease_ttl_secs = next.registry.lease_ttl_secs,
                    down_retention_secs = next.registry.down_retention_secs,
                    "Configuration reloaded"
                );
                config.store(Arc::new(next));
            }
            _ = shutdown.recv() => break,
        }
    }
}
