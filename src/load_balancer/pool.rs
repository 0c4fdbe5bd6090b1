//! Backend pool management.
//!
//! # Responsibilities
//! - Own the ordered, append-only list of backends
//! - Hand out cheap snapshots for selection and health sweeps
//! - Carry the settings new backends are created with

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use url::Url;
use crate::config::BackendConfig;
use crate::health::probe::Probe;
use crate::http::forward::{DemotionPolicy, Forwarder};
use crate::load_balancer::backend::Backend;

/// Error type for pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid backend address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Parse a backend address into the URL the pool stores.
///
/// Only absolute `http` URLs with a host are accepted.
pub fn parse_backend_url(address: &str) -> Result<Url, PoolError> {
    let invalid = |reason: String| PoolError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Settings applied to backends as they are added.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub cache_window: Duration,
    pub demotion: DemotionPolicy,
}

struct PoolInner {
    backends: Vec<Arc<Backend>>,
    settings: PoolSettings,
}

/// The ordered set of backends behind the balancer.
///
/// Membership has its own lock, separate from every backend's liveness
/// lock. It is only held to copy or push `Arc`s, never across a probe.
pub struct BackendPool {
    inner: RwLock<PoolInner>,
    probe: Arc<dyn Probe>,
    forwarder: Arc<dyn Forwarder>,
}

impl BackendPool {
    /// Create an empty pool.
    pub fn new(probe: Arc<dyn Probe>, forwarder: Arc<dyn Forwarder>, settings: PoolSettings) -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                backends: Vec::new(),
                settings,
            }),
            probe,
            forwarder,
        }
    }

    /// Parse `address` and append a new, optimistically alive backend.
    pub fn add(&self, address: &str) -> Result<Arc<Backend>, PoolError> {
        let url = parse_backend_url(address)?;

        let backend = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let backend = Arc::new(Backend::new(
                url,
                inner.settings.cache_window,
                self.probe.clone(),
                self.forwarder.clone(),
                inner.settings.demotion,
            ));
            inner.backends.push(backend.clone());
            backend
        };

        tracing::info!(backend = %backend.url(), "Added backend");
        Ok(backend)
    }

    /// Current members, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .backends
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .backends
            .iter()
            .any(|b| b.url() == url)
    }

    pub fn settings(&self) -> PoolSettings {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).settings
    }

    /// Change the cache window of every current and future backend.
    pub fn set_cache_window(&self, window: Duration) {
        let backends = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.settings.cache_window = window;
            inner.backends.clone()
        };
        for backend in backends {
            backend.set_cache_window(window);
        }
    }

    /// Bring the pool in line with a reloaded backend list.
    ///
    /// Unknown addresses are appended. Addresses missing from `configs` are
    /// kept, since the pool never shrinks. Returns how many were added.
    pub fn extend_from_config(&self, configs: &[BackendConfig]) -> usize {
        let mut added = 0;
        for config in configs {
            match parse_backend_url(&config.address) {
                Ok(url) if self.contains(&url) => {}
                Ok(_) => match self.add(&config.address) {
                    Ok(_) => added += 1,
                    Err(e) => tracing::warn!(error = %e, "Skipping backend"),
                },
                Err(e) => tracing::warn!(error = %e, "Skipping backend"),
            }
        }
        added
    }
}
