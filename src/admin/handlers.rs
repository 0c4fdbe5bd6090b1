use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use crate::config::BackendConfig;
use crate::http::server::AppState;
use crate::load_balancer::pool::parse_backend_url;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BackendStatus {
    pub address: String,
    pub name: Option<String>,
    pub alive: bool,
    pub last_checked_secs_ago: f64,
    pub cache_window_ms: u64,
}

/// Display names for backends, keyed by normalized URL.
#[derive(Debug, Default)]
pub struct BackendNames {
    names: RwLock<HashMap<String, String>>,
}

impl BackendNames {
    /// Record the names found in `configs`. Existing names are overwritten,
    /// never removed.
    pub fn update(&self, configs: &[BackendConfig]) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        for config in configs {
            if let (Some(name), Ok(url)) = (&config.name, parse_backend_url(&config.address)) {
                names.insert(url.to_string(), name.clone());
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }
}

/// Liveness of every backend, as currently cached. Never triggers a probe.
pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .dispatcher
        .pool()
        .snapshot()
        .iter()
        .map(|backend| {
            let liveness = backend.liveness();
            BackendStatus {
                address: backend.url().to_string(),
                name: state.names.get(backend.url().as_str()),
                alive: liveness.alive,
                last_checked_secs_ago: liveness.last_checked.elapsed().as_secs_f64(),
                cache_window_ms: u64::try_from(liveness.cache_window.as_millis()).unwrap_or(u64::MAX),
            }
        })
        .collect();

    Json(statuses)
}
