//! Forwarding requests to an origin.
//!
//! # Responsibilities
//! - Rewrite the inbound request onto the chosen origin
//! - Strip hop-by-hop headers, append `x-forwarded-for`
//! - Classify failures so the caller can decide whether to demote
//!
//! # Design Decisions
//! - Any response from the origin, whatever its status, is a success here
//! - The timeout covers the response head only; bodies stream through

use std::net::SocketAddr;
use std::time::Duration;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request, Response, Uri, Version},
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};
use tokio::time;
use url::Url;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Why a request could not be proxied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("cannot build origin request: {0}")]
    InvalidTarget(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("client aborted the request: {0}")]
    ClientAborted(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ForwardError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidTarget(_) => "invalid_target",
            ForwardError::Connect(_) => "connect",
            ForwardError::ClientAborted(_) => "client_aborted",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Upstream(_) => "upstream",
        }
    }

    fn classify(err: &hyper_util::client::legacy::Error) -> Self {
        let detail = error_chain(err);
        if err.is_connect() {
            return ForwardError::Connect(detail);
        }

        let mut source = std::error::Error::source(err);
        while let Some(inner) = source {
            if let Some(hyper_err) = inner.downcast_ref::<hyper::Error>() {
                if hyper_err.is_user() || hyper_err.is_body_write_aborted() {
                    return ForwardError::ClientAborted(detail);
                }
            }
            source = inner.source();
        }
        ForwardError::Upstream(detail)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

/// Which forwarding errors take a backend out of rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionPolicy {
    /// Every forwarding error demotes the backend.
    #[default]
    AnyError,
    /// Errors caused by the client side (aborted request body) are ignored.
    OriginOnly,
}

impl DemotionPolicy {
    pub fn should_demote(&self, err: &ForwardError) -> bool {
        match self {
            DemotionPolicy::AnyError => true,
            DemotionPolicy::OriginOnly => !matches!(err, ForwardError::ClientAborted(_)),
        }
    }
}

/// Proxies one request to one origin.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, origin: &Url, request: Request<Body>) -> Result<Response<Body>, ForwardError>;
}

/// Forwarder backed by a pooled hyper client.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperForwarder {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self { client, timeout }
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(&self, origin: &Url, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let request = rewrite_request(origin, request)?;

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Ok(Err(e)) => Err(ForwardError::classify(&e)),
            Err(_) => Err(ForwardError::Timeout(self.timeout)),
        }
    }
}

/// Point `request` at `origin`, keeping its path and query.
pub fn rewrite_request(origin: &Url, request: Request<Body>) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();

    let host = origin
        .host_str()
        .ok_or_else(|| ForwardError::InvalidTarget(format!("{origin} has no host")))?;
    let port = origin.port_or_known_default().unwrap_or(80);
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!(
        "{}://{}:{}{}{}",
        origin.scheme(),
        host,
        port,
        origin.path().trim_end_matches('/'),
        path_and_query
    );
    parts.uri = target
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;
    parts.version = Version::HTTP_11;

    for name in HOP_BY_HOP {
        parts.headers.remove(*name);
    }

    if let Some(ConnectInfo(client)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        let ip = client.ip().to_string();
        let value = match parts.headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }
    }

    Ok(Request::from_parts(parts, body))
}
