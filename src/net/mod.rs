//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (hijack handle, HTTP/1.1 serving, close signal)
//!     → gate decides per request
//!
//! Connection States:
//!     Active → Draining (shutdown) → Closed
//!     Active → Closed (hijacked by the gate)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - A hijacked connection is dropped without writing another byte

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
