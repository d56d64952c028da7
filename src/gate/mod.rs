//! Response gate subsystem.
//!
//! # Data Flow
//! ```text
//! Request (carrying an optional HijackHandle)
//!     → layer.rs (DropConnection service, one snapshot of the policy)
//!     → capture.rs (upstream response fully buffered)
//!     → policy.rs (status checked against the configured range)
//!     → Deliver: replay captured status, headers, body
//!     → Drop: sink.rs (relinquish and close the raw connection)
//! ```
//!
//! # Design Decisions
//! - The response is never streamed; nothing reaches the client before the decision
//! - Exactly one of replay or termination happens per request
//! - Hijacking is a capability on the sink, absent for connections the host cannot give up
//! - A sink that cannot be hijacked degrades to a bare 500

pub mod capture;
pub mod error;
pub mod layer;
pub mod policy;
pub mod sink;

pub use capture::CaptureSink;
pub use error::{ConfigurationError, GateError};
pub use layer::{handle, DropConnection, DropConnectionLayer, Outcome};
pub use policy::{Bound, Decision, StatusPolicy, StatusRange};
pub use sink::{CloseSignal, HijackHandle, RawConnection, Sink};
