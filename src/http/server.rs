//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the pool, probe, forwarder and dispatcher from config
//! - Create the Axum router: status path, then everything else to the dispatcher
//! - Wire up middleware (tracing, request ID)
//! - Run the health sweep and apply config reloads in the background
//! - Serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::{handlers::BackendNames, setup_admin_router};
use crate::config::ProxyConfig;
use crate::health::active::HealthMonitor;
use crate::health::probe::HttpProbe;
use crate::http::forward::HyperForwarder;
use crate::http::handler::fallback_router;
use crate::load_balancer::dispatcher::Dispatcher;
use crate::load_balancer::pool::{BackendPool, PoolSettings};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub names: Arc<BackendNames>,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    config: ProxyConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Backends with an invalid address are logged and skipped.
    pub fn new(config: ProxyConfig) -> Self {
        let probe = Arc::new(HttpProbe::new());
        let forwarder = Arc::new(HyperForwarder::new(config.forwarding.request_timeout()));
        let pool = BackendPool::new(
            probe,
            forwarder,
            PoolSettings {
                cache_window: config.health_check.cache_window(),
                demotion: config.forwarding.demotion,
            },
        );

        for backend in &config.backends {
            match pool.add(&backend.address) {
                Ok(b) => tracing::info!(backend = %b.url(), name = ?backend.name, "Backend added"),
                Err(e) => tracing::warn!(error = %e, "Skipping backend"),
            }
        }

        let names = Arc::new(BackendNames::default());
        names.update(&config.backends);

        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(pool))),
            names,
        };
        Self { config, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let dispatcher = state.dispatcher.clone();
        let router = setup_admin_router(&config.admin.status_path, state);

        fallback_router(router, dispatcher).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` are applied while running. The
    /// server, the health sweep and the reload applier stop when `shutdown`
    /// fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.state.dispatcher.pool().len(),
            "HTTP server starting"
        );

        let pool = self.state.dispatcher.pool().clone();

        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(pool.clone(), self.config.health_check.interval());
            tokio::spawn(monitor.run(shutdown.resubscribe()));
        } else {
            tracing::info!("Background health sweep disabled, relying on lazy checks");
        }

        let reloader = ConfigReloader::new(pool, self.state.names.clone(), self.config.clone());
        tokio::spawn(apply_config_updates(reloader, config_updates, shutdown.resubscribe()));

        let app = Self::build_router(&self.config, self.state)
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.state.dispatcher
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

async fn apply_config_updates(
    mut reloader: ConfigReloader,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => {
                    reloader.apply(update);
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

/// What a reload changed.
#[derive(Debug, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Backends appended to the pool.
    pub added: usize,
    /// Changed fields that only take effect after a restart.
    pub restart_required: Vec<&'static str>,
}

/// Applies reloaded configs to a running pool.
///
/// Each applied config becomes the baseline for the next one, so a
/// restart-only change is reported once.
pub struct ConfigReloader {
    pool: Arc<BackendPool>,
    names: Arc<BackendNames>,
    running: ProxyConfig,
}

impl ConfigReloader {
    pub fn new(pool: Arc<BackendPool>, names: Arc<BackendNames>, running: ProxyConfig) -> Self {
        Self { pool, names, running }
    }

    /// Append new backends and apply the cache window. Everything else is
    /// logged if it changed.
    pub fn apply(&mut self, update: ProxyConfig) -> ReloadOutcome {
        let added = self.pool.extend_from_config(&update.backends);
        self.names.update(&update.backends);

        let window = update.health_check.cache_window();
        if window != self.pool.settings().cache_window {
            self.pool.set_cache_window(window);
            tracing::info!(cache_window = ?window, "Cache window updated");
        }

        let restart_required = restart_only_changes(&self.running, &update);
        for field in &restart_required {
            tracing::warn!(field, "Change requires a restart");
        }

        tracing::info!(added, backends = self.pool.len(), "Configuration reloaded");
        self.running = update;
        ReloadOutcome { added, restart_required }
    }
}

fn restart_only_changes(running: &ProxyConfig, update: &ProxyConfig) -> Vec<&'static str> {
    let checks = [
        ("listener.bind_address", running.listener.bind_address != update.listener.bind_address),
        ("health_check.enabled", running.health_check.enabled != update.health_check.enabled),
        ("health_check.interval_ms", running.health_check.interval_ms != update.health_check.interval_ms),
        ("forwarding.demotion", running.forwarding.demotion != update.forwarding.demotion),
        (
            "forwarding.request_timeout_secs",
            running.forwarding.request_timeout_secs != update.forwarding.request_timeout_secs,
        ),
        ("admin.status_path", running.admin.status_path != update.admin.status_path),
        ("test_backends.ports", running.test_backends.ports != update.test_backends.ports),
    ];
    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}
