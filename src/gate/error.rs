//! Gate errors.

use std::num::ParseIntError;
use thiserror::Error;

use crate::gate::policy::Bound;
use crate::net::connection::ConnectionId;

/// A status range option that cannot be turned into a policy.
///
/// Raised at setup time only; a gate is never built from a bad range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The value did not split into exactly two dash-separated tokens.
    #[error("status code range '{value}' must be '<lower>-<upper>', found {found} token(s)")]
    TokenCount { value: String, found: usize },

    /// One of the two tokens is not a status code.
    #[error("{bound} status code '{token}' is not a valid integer: {source}")]
    InvalidBound {
        bound: Bound,
        token: String,
        #[source]
        source: ParseIntError,
    },
}

/// Errors raised while handling a single request.
///
/// None of these are fatal to the gate; they are logged and the request ends.
#[derive(Debug, Error)]
pub enum GateError {
    /// Writing the replayed response to the client failed.
    #[error("failed to write replayed response: {0}")]
    ReplayWrite(#[source] hyper::Error),

    /// The response sink cannot relinquish its connection.
    #[error("cannot terminate connection: response sink does not support hijacking")]
    TerminationUnsupported,

    /// The connection was already relinquished by an earlier request.
    #[error("connection {0} was already hijacked")]
    AlreadyHijacked(ConnectionId),

    /// The connection was hijacked but closing it failed.
    #[error("failed to close hijacked connection {0}: connection task is gone")]
    Termination(ConnectionId),

    /// The upstream body could not be buffered.
    #[error("failed to buffer upstream body: {0}")]
    UpstreamBody(#[source] axum::Error),
}
