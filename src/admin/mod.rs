//! Balancer status endpoint.
//!
//! Mounted on the configured status path of the balancer's own listener.
//! Every other path goes to the dispatcher.

pub mod handlers;

use axum::{routing::get, Router};
use crate::http::server::AppState;
use self::handlers::get_backends;

pub fn setup_admin_router(status_path: &str, state: AppState) -> Router {
    Router::new()
        .route(status_path, get(get_backends))
        .with_state(state)
}
