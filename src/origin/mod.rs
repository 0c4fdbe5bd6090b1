//! Test origins for local runs and integration tests.
//!
//! Each [`TestBackend`] is a tiny HTTP server with a `/control` endpoint
//! that forces failures or adds latency. The balancer has no special
//! knowledge of them: forced failures look like any other failing origin.

pub mod duration;
pub mod test_backend;

pub use duration::{parse_duration, DurationError};
pub use test_backend::{TestBackend, CONTROL_PATH};
