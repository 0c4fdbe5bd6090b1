//! Active health checking.
//!
//! # Responsibilities
//! - Periodically sweep the pool
//! - Launch one independent probe per backend per sweep

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio::sync::broadcast;
use crate::load_balancer::pool::BackendPool;

pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Sweep every `interval` until shutdown. The first sweep happens one
    /// interval after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Health monitor starting");

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Spawn a probe for every backend without waiting for any of them.
    ///
    /// Probes from an earlier sweep may still be running; whichever
    /// finishes last decides the backend's state.
    pub fn sweep(&self) -> usize {
        let backends = self.pool.snapshot();
        tracing::debug!(backends = backends.len(), "Health sweep");

        for backend in &backends {
            let backend = backend.clone();
            tokio::spawn(async move {
                backend.check_health().await;
            });
        }
        backends.len()
    }
}
