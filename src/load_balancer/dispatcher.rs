//! Request dispatch.
//!
//! # Responsibilities
//! - Pick the next live backend for each inbound request
//! - Forward to it, or answer 503 when nothing is available

use std::sync::Arc;
use std::time::Instant;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};
use crate::http::handler::Handler;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::pool::BackendPool;
use crate::load_balancer::round_robin::{RoundRobin, SelectError};
use crate::observability::metrics;

/// Body returned to the client when no backend can take the request.
pub const NO_AVAILABLE_BACKENDS: &str = "No available backends";

/// The load balancer proper: one pool, one cursor.
///
/// Each instance owns its own cursor, so several balancers can coexist
/// in one process.
pub struct Dispatcher {
    pool: Arc<BackendPool>,
    selector: RoundRobin,
}

impl Dispatcher {
    pub fn new(pool: Arc<BackendPool>) -> Self {
        Self {
            pool,
            selector: RoundRobin::new(),
        }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Choose the backend for the next request.
    ///
    /// The pool lock is only held while copying the member list; liveness
    /// checks run on the copy.
    pub async fn pick(&self) -> Result<Arc<Backend>, SelectError> {
        let backends = self.pool.snapshot();
        self.selector.next_server(&backends).await
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start_time = Instant::now();

        match self.pick().await {
            Ok(backend) => {
                tracing::debug!(
                    backend = %backend.url(),
                    method = %request.method(),
                    path = %request.uri().path(),
                    "Forwarding client request to backend"
                );
                let response = backend.forward(request).await;
                metrics::record_dispatch("forwarded", start_time);
                response
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %request.uri().path(), "No backend available");
                let outcome = match e {
                    SelectError::NoBackendsConfigured => "no_backends",
                    SelectError::NoHealthyBackend { .. } => "no_healthy_backend",
                };
                metrics::record_dispatch(outcome, start_time);
                (StatusCode::SERVICE_UNAVAILABLE, NO_AVAILABLE_BACKENDS).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::http::forward::{DemotionPolicy, ForwardError};
    use crate::load_balancer::pool::PoolSettings;
    use crate::load_balancer::testing::{RecordingForwarder, ScriptedProbe};

    const WINDOW: Duration = Duration::from_secs(2);

    fn dispatcher(
        hosts: &[&str],
        probe: &Arc<ScriptedProbe>,
        forwarder: &Arc<RecordingForwarder>,
    ) -> Dispatcher {
        let pool = BackendPool::new(
            probe.clone(),
            forwarder.clone(),
            PoolSettings {
                cache_window: WINDOW,
                demotion: DemotionPolicy::AnyError,
            },
        );
        for host in hosts {
            pool.add(&format!("http://{host}")).unwrap();
        }
        Dispatcher::new(Arc::new(pool))
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn pick_host(dispatcher: &Dispatcher) -> String {
        let backend = dispatcher.pick().await.unwrap();
        backend.url().host_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_empty_pool_returns_503_without_forwarding() {
        let forwarder = RecordingForwarder::ok();
        let dispatcher = dispatcher(&[], &ScriptedProbe::healthy(), &forwarder);

        let response = dispatcher.handle(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, NO_AVAILABLE_BACKENDS);
        assert_eq!(forwarder.calls(), 0);
        assert_eq!(dispatcher.pick().await.unwrap_err(), SelectError::NoBackendsConfigured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_backend_drops_out_of_rotation() {
        let probe = ScriptedProbe::healthy();
        let dispatcher = dispatcher(&["a", "b", "c"], &probe, &RecordingForwarder::ok());

        let mut first_round = Vec::new();
        for _ in 0..3 {
            first_round.push(pick_host(&dispatcher).await);
        }
        assert_eq!(first_round, ["a", "b", "c"]);

        probe.set_host_down("b", true);
        tokio::time::advance(WINDOW).await;

        let mut second_round = Vec::new();
        for _ in 0..3 {
            second_round.push(pick_host(&dispatcher).await);
        }
        // Cursor 4 starts at b and falls through to c; cursor 5 starts at c.
        assert_eq!(second_round, ["a", "c", "c"]);
        assert_eq!(probe.calls_for("b"), 1);

        let mut third_round = Vec::new();
        for _ in 0..4 {
            third_round.push(pick_host(&dispatcher).await);
        }
        assert_eq!(third_round, ["a", "c", "c", "a"]);
        assert_eq!(probe.calls_for("b"), 1);
    }

    #[tokio::test]
    async fn test_forwarding_failure_skipped_by_next_dispatch() {
        let probe = ScriptedProbe::healthy();
        let forwarder = RecordingForwarder::ok();
        forwarder.fail_host("x", ForwardError::Connect("refused".into()));
        let dispatcher = dispatcher(&["x", "y"], &probe, &forwarder);

        // Cursor 0 lands on x, whose forward fails and demotes it.
        let response = dispatcher.handle(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "Backend is not available");

        for _ in 0..4 {
            let response = dispatcher.handle(request()).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, "http://y/");
        }
        assert_eq!(forwarder.calls_for("x"), 1);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_unhealthy_returns_503_without_forwarding() {
        let forwarder = RecordingForwarder::ok();
        let probe = ScriptedProbe::failing();
        let dispatcher = dispatcher(&["a", "b", "c"], &probe, &forwarder);

        tokio::time::advance(WINDOW).await;
        let response = dispatcher.handle(request()).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(probe.calls(), 3);
        assert_eq!(forwarder.calls(), 0);
        assert_eq!(
            dispatcher.pick().await.unwrap_err(),
            SelectError::NoHealthyBackend { checked: 3 }
        );
    }

    #[tokio::test]
    async fn test_handle_forwards_round_robin() {
        let forwarder = RecordingForwarder::ok();
        let dispatcher = dispatcher(&["a", "b"], &ScriptedProbe::healthy(), &forwarder);

        let mut bodies = Vec::new();
        for _ in 0..4 {
            let response = dispatcher.handle(request()).await;
            assert_eq!(response.status(), StatusCode::OK);
            bodies.push(body_text(response).await);
        }
        assert_eq!(bodies, ["http://a/", "http://b/", "http://a/", "http://b/"]);
        assert_eq!(forwarder.calls(), 4);
    }

    #[tokio::test]
    async fn test_independent_dispatchers_have_independent_cursors() {
        let first = dispatcher(&["a", "b"], &ScriptedProbe::healthy(), &RecordingForwarder::ok());
        let second = Dispatcher::new(first.pool().clone());

        assert_eq!(pick_host(&first).await, "a");
        assert_eq!(pick_host(&second).await, "a");
        assert_eq!(pick_host(&first).await, "b");
    }
}
