//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals and timeouts > 0, addresses parse)
//! - Detect duplicate backends and test origin ports
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Backend addresses go through the same parser the pool uses

use std::collections::HashSet;
use std::net::SocketAddr;
use crate::config::schema::ProxyConfig;
use crate::load_balancer::pool::parse_backend_url;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a socket address")]
    InvalidSocketAddress { field: &'static str, value: String },
    #[error("backends[{index}]: {reason}")]
    InvalidBackend { index: usize, reason: String },
    #[error("backends[{index}]: duplicate address `{address}`")]
    DuplicateBackend { index: usize, address: String },
    #[error("test_backends.ports: duplicate port {0}")]
    DuplicateTestPort(u16),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("admin.status_path: `{0}` must be a literal path starting with '/' and other than '/'")]
    StatusPath(String),
}

/// A path the router matches verbatim: no captures or wildcards, and not
/// the root, which would shadow every forwarded `GET /`.
fn is_literal_path(path: &str) -> bool {
    path.starts_with('/')
        && path != "/"
        && !path.contains(|c| matches!(c, ':' | '*' | '{' | '}'))
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidSocketAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let mut seen = HashSet::new();
    for (index, backend) in config.backends.iter().enumerate() {
        match parse_backend_url(&backend.address) {
            Ok(url) => {
                if !seen.insert(url.clone()) {
                    errors.push(ValidationError::DuplicateBackend {
                        index,
                        address: url.to_string(),
                    });
                }
            }
            Err(e) => errors.push(ValidationError::InvalidBackend {
                index,
                reason: e.to_string(),
            }),
        }
    }

    let mut ports = HashSet::new();
    for port in &config.test_backends.ports {
        if !ports.insert(*port) {
            errors.push(ValidationError::DuplicateTestPort(*port));
        }
    }

    if config.health_check.interval_ms == 0 {
        errors.push(ValidationError::Zero("health_check.interval_ms"));
    }
    if config.health_check.cache_window_ms == 0 {
        errors.push(ValidationError::Zero("health_check.cache_window_ms"));
    }
    if config.forwarding.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("forwarding.request_timeout_secs"));
    }

    if !is_literal_path(&config.admin.status_path) {
        errors.push(ValidationError::StatusPath(config.admin.status_path.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
