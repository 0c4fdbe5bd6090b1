//! The request handling seam shared by the balancer and test origins.

use std::sync::Arc;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};

/// Handle one request, produce one response.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Body>) -> Response<Body>;
}

/// Route every request that no other route claims to `handler`.
pub fn fallback_router<S, H>(router: Router<S>, handler: Arc<H>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    H: Handler,
{
    router.fallback(move |request: Request<Body>| async move { handler.handle(request).await })
}
