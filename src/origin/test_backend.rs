//! Test origin server.
//!
//! # Responsibilities
//! - Answer client traffic and health probes like a small origin would
//! - Count requests
//! - Expose `/control` to force failures and inject latency
//!
//! # Design Decisions
//! - Forced failure applies to health probes too, so the balancer sees it
//!   through both lazy and scheduled checks
//! - Settings are plain atomics; no lock around a request

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, Response, StatusCode},
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use crate::http::handler::{fallback_router, Handler};
use crate::origin::duration::parse_duration;

/// Path of the control endpoint.
pub const CONTROL_PATH: &str = "/control";

/// An origin whose behavior can be changed at runtime.
#[derive(Debug)]
pub struct TestBackend {
    port: u16,
    request_count: AtomicU64,
    failure_mode: AtomicBool,
    delay_us: AtomicU64,
}

impl TestBackend {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            request_count: AtomicU64::new(0),
            failure_mode: AtomicBool::new(false),
            delay_us: AtomicU64::new(0),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Requests served so far, control requests excluded.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn failure_mode(&self) -> bool {
        self.failure_mode.load(Ordering::Relaxed)
    }

    pub fn set_failure_mode(&self, fail: bool) {
        self.failure_mode.store(fail, Ordering::Relaxed);
        tracing::info!(port = self.port, failure_mode = fail, "Backend failure mode set");
    }

    pub fn delay(&self) -> Duration {
        Duration::from_micros(self.delay_us.load(Ordering::Relaxed))
    }

    pub fn set_delay(&self, delay: Duration) {
        let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.delay_us.store(micros, Ordering::Relaxed);
        tracing::info!(port = self.port, delay = ?delay, "Backend delay set");
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(port = self.port, address = %listener.local_addr()?, "Starting test backend");

        let app: Router = fallback_router(Router::new(), self);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
    }

    fn handle_control(&self, request: &Request<Body>) -> Response<Body> {
        if request.method() != Method::POST {
            return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
        }

        let query = request.uri().query().unwrap_or_default();
        let mut failure = None;
        let mut delay = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "failure" if !value.is_empty() => failure = Some(value == "true"),
                "delay" if !value.is_empty() => match parse_duration(&value) {
                    Ok(d) => delay = Some(d),
                    Err(e) => {
                        tracing::warn!(port = self.port, error = %e, "Rejected control request");
                        return (StatusCode::BAD_REQUEST, "Invalid delay format").into_response();
                    }
                },
                _ => {}
            }
        }

        if let Some(fail) = failure {
            self.set_failure_mode(fail);
        }
        if let Some(delay) = delay {
            self.set_delay(delay);
        }

        (StatusCode::OK, format!("Backend :{} settings updated\n", self.port)).into_response()
    }
}

#[async_trait]
impl Handler for TestBackend {
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        if request.uri().path() == CONTROL_PATH {
            return self.handle_control(&request);
        }

        let count = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        let is_probe = request.method() == Method::HEAD;
        let kind = if is_probe { "HEALTH" } else { "CLIENT" };
        tracing::info!(
            port = self.port,
            kind,
            method = %request.method(),
            path = %request.uri().path(),
            "Request #{}",
            count
        );

        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failure_mode() {
            tracing::warn!(port = self.port, method = %request.method(), "Failing request (failure mode on)");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Backend :{} is in failure mode\n", self.port),
            )
                .into_response();
        }

        if is_probe {
            return StatusCode::OK.into_response();
        }
        (
            StatusCode::OK,
            format!("Response from backend :{} (request #{})\n", self.port, count),
        )
            .into_response()
    }
}
