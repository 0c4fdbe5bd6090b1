//! Liveness probes.
//!
//! # Responsibilities
//! - Issue one lightweight request against a backend
//! - Bound it by the caller's timeout
//! - Report success only for a 2xx answer

use std::time::Duration;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::time;
use url::Url;

/// Why a probe counted as a failure.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to build probe request: {0}")]
    Request(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("non-success status {0}")]
    Status(StatusCode),
}

/// Answers "is this backend up right now?".
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &Url, timeout: Duration) -> Result<(), ProbeError>;
}

/// `HEAD` probe over a shared hyper client.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .build(HttpConnector::new());

        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, target: &Url, timeout: Duration) -> Result<(), ProbeError> {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri(target.as_str())
            .header(header::USER_AGENT, "lb-proxy-health-check")
            .body(Body::empty())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(ProbeError::Status(response.status())),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}
