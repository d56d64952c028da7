//! HTTP response gate.
//!
//! Buffers each upstream response, checks its status against a configured
//! range and either replays it untouched or drops the client connection
//! without sending a single byte.

pub mod config;
pub mod gate;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::GateConfig;
pub use gate::{DropConnectionLayer, StatusPolicy};
pub use http::GateServer;
pub use lifecycle::Shutdown;
