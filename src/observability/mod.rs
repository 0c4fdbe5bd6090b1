//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, backends, health monitor:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until a recorder is installed
//! - Request IDs are attached by the HTTP layer, not here

pub mod logging;
pub mod metrics;
