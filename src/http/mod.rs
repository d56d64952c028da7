//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (net)
//!     → server.rs (request ID, trace span, timeout)
//!     → gate (buffer, decide)
//!     → upstream.rs (forward to the upstream server)
//!     → gate replays the response, or the connection is dropped
//! ```

pub mod server;
pub mod upstream;

pub use server::GateServer;
pub use upstream::UpstreamState;
