//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single origin server
//! - Cache its liveness for a bounded window
//! - Re-probe lazily when the cached value has expired
//! - Demote itself when forwarding to it fails

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};
use tokio::time::Instant;
use url::Url;
use crate::health::probe::Probe;
use crate::http::forward::{DemotionPolicy, Forwarder};
use crate::observability::metrics;

/// Body returned to the client when forwarding fails.
pub const BACKEND_UNAVAILABLE: &str = "Backend is not available";

/// A consistent view of a backend's liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub alive: bool,
    pub last_checked: Instant,
    pub cache_window: Duration,
}

impl Liveness {
    /// The cached value, if it is still inside its window.
    fn fresh(&self) -> Option<bool> {
        (self.last_checked.elapsed() < self.cache_window).then_some(self.alive)
    }
}

/// A single backend server.
pub struct Backend {
    url: Url,
    /// `alive` and `last_checked` only ever change together under this lock.
    liveness: RwLock<Liveness>,
    probe: Arc<dyn Probe>,
    forwarder: Arc<dyn Forwarder>,
    demotion: DemotionPolicy,
}

impl Backend {
    /// Create a backend, optimistically alive as of now.
    pub fn new(
        url: Url,
        cache_window: Duration,
        probe: Arc<dyn Probe>,
        forwarder: Arc<dyn Forwarder>,
        demotion: DemotionPolicy,
    ) -> Self {
        Self {
            url,
            liveness: RwLock::new(Liveness {
                alive: true,
                last_checked: Instant::now(),
                cache_window,
            }),
            probe,
            forwarder,
            demotion,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Snapshot of the liveness triple, without triggering a probe.
    pub fn liveness(&self) -> Liveness {
        *self.liveness.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache_window(&self) -> Duration {
        self.liveness().cache_window
    }

    /// Change how long results are trusted (and how long probes may take).
    pub fn set_cache_window(&self, window: Duration) {
        let mut liveness = self.liveness.write().unwrap_or_else(PoisonError::into_inner);
        liveness.cache_window = window;
    }

    /// Cached liveness, re-probing first if the cache has expired.
    ///
    /// The read lock is released before probing, so other callers keep
    /// seeing the stale value until the probe commits.
    pub async fn is_alive(&self) -> bool {
        let cached = self.liveness().fresh();
        match cached {
            Some(alive) => alive,
            None => {
                tracing::debug!(backend = %self.url, "Liveness cache expired, probing");
                self.check_health().await
            }
        }
    }

    /// Probe the backend now and commit the result.
    pub async fn check_health(&self) -> bool {
        let timeout = self.cache_window();
        let alive = match self.probe.probe(&self.url, timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = %self.url, error = %e, "Health check failed");
                false
            }
        };
        metrics::record_probe(self.url.as_str(), alive);

        self.set_alive(alive);
        alive
    }

    /// Commit a liveness value stamped with the current time.
    pub fn set_alive(&self, alive: bool) {
        let was_alive = {
            let mut liveness = self.liveness.write().unwrap_or_else(PoisonError::into_inner);
            let was_alive = liveness.alive;
            liveness.alive = alive;
            liveness.last_checked = Instant::now();
            was_alive
        };

        if was_alive != alive {
            if alive {
                tracing::info!(backend = %self.url, "Backend is back up");
            } else {
                tracing::info!(backend = %self.url, "Backend marked down");
            }
        }
        metrics::record_backend_health(self.url.as_str(), alive);
    }

    /// Proxy `request` to this backend.
    ///
    /// A forwarding error demotes the backend immediately (subject to the
    /// demotion policy) and becomes a 503 for the client.
    pub async fn forward(&self, request: Request<Body>) -> Response<Body> {
        match self.forwarder.forward(&self.url, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(backend = %self.url, error = %e, "Proxy error");
                metrics::record_forward_failure(self.url.as_str(), e.kind());
                if self.demotion.should_demote(&e) {
                    self.set_alive(false);
                }
                (StatusCode::SERVICE_UNAVAILABLE, BACKEND_UNAVAILABLE).into_response()
            }
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("url", &self.url.as_str())
            .field("liveness", &self.liveness())
            .field("demotion", &self.demotion)
            .finish_non_exhaustive()
    }
}
