//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Lazy checks (load_balancer::backend):
//!     Selection finds a stale cache entry
//!     → probe.rs probes inline
//!     → liveness committed
//!
//! Scheduled sweep (active.rs):
//!     Periodic timer
//!     → one probe task per backend
//!     → liveness committed
//!
//! Demotion (load_balancer::backend):
//!     Forwarding error
//!     → marked down immediately
//! ```
//!
//! # Design Decisions
//! - One probe decides the state; no success/failure thresholds
//! - The probe timeout is the backend's cache window

pub mod active;
pub mod probe;

pub use active::HealthMonitor;
pub use probe::{HttpProbe, Probe, ProbeError};
