//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → dispatcher.rs (snapshot the pool)
//!     → round_robin.rs (advance cursor, probe forward for a live backend)
//!     → backend.rs (cached liveness, lazy re-probe on expiry)
//!     → backend.rs forward → origin, or 503
//! ```
//!
//! # Design Decisions
//! - Pool membership and per-backend liveness are separate lock domains
//! - Neither lock is held across a network call
//! - A forwarding error demotes its backend right away
//! - The pool only grows

pub mod backend;
pub mod dispatcher;
pub mod pool;
pub mod round_robin;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, Liveness};
pub use dispatcher::Dispatcher;
pub use pool::{BackendPool, PoolError, PoolSettings};
pub use round_robin::{RoundRobin, SelectError};
