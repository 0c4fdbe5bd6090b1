//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, access tracing)
//!     → handler.rs (fallback to the dispatcher)
//!     → [load balancer picks a backend]
//!     → forward.rs (rewrite onto the origin, send, classify errors)
//!     → response streamed back unchanged
//! ```

pub mod forward;
pub mod handler;
pub mod server;

pub use handler::Handler;
pub use server::HttpServer;
