//! Status code policy.
//!
//! A policy is built once from a `"<lower>-<upper>"` option and never changes.
//! The inclusive range names the status codes whose responses are dropped;
//! every other status is delivered. An empty option disables the range, and a
//! disabled gate drops everything.

use std::fmt;

use axum::http::StatusCode;

use crate::gate::error::ConfigurationError;

/// Which end of the range a token describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Lower => write!(f, "lower"),
            Bound::Upper => write!(f, "upper"),
        }
    }
}

/// Inclusive status code range.
///
/// Bounds are plain integers and may lie outside the status code space, so
/// `"500-99999"` reads as "500 and up".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRange {
    pub lower: i64,
    pub upper: i64,
}

impl StatusRange {
    /// True when `lower <= status <= upper`. Always false for an inverted range.
    pub fn contains(&self, status: u16) -> bool {
        let status = i64::from(status);
        self.lower <= status && status <= self.upper
    }

    /// True when `lower > upper`, i.e. no status can match.
    pub fn is_inverted(&self) -> bool {
        self.lower > self.upper
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

/// What the gate does with a captured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Replay the captured response to the client.
    Deliver,
    /// Terminate the connection without a response.
    Drop,
}

/// Immutable status code policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPolicy {
    range: Option<StatusRange>,
}

impl StatusPolicy {
    /// A policy with no range. Every request is dropped.
    pub fn disabled() -> Self {
        Self { range: None }
    }

    /// A policy dropping responses whose status lies in `range`.
    pub fn with_range(range: StatusRange) -> Self {
        Self { range: Some(range) }
    }

    /// Parse a `"<lower>-<upper>"` option. The empty string disables the policy.
    ///
    /// Bounds are taken as given; an inverted range is accepted and simply
    /// matches nothing.
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        if value.is_empty() {
            return Ok(Self::disabled());
        }

        let tokens: Vec<&str> = value.split('-').collect();
        let [lower, upper] = tokens.as_slice() else {
            return Err(ConfigurationError::TokenCount {
                value: value.to_string(),
                found: tokens.len(),
            });
        };

        let range = StatusRange {
            lower: parse_bound(Bound::Lower, lower)?,
            upper: parse_bound(Bound::Upper, upper)?,
        };

        if range.is_inverted() {
            tracing::warn!(
                range = %range,
                "Status code range is inverted; no response will be dropped"
            );
        }

        Ok(Self::with_range(range))
    }

    /// Whether a range is configured.
    pub fn is_enabled(&self) -> bool {
        self.range.is_some()
    }

    /// The configured range, if any.
    pub fn range(&self) -> Option<StatusRange> {
        self.range
    }

    /// True when `status` falls inside the configured range, marking the
    /// response for dropping. Meaningless for a disabled policy, which
    /// returns false here; use [`StatusPolicy::decide`] for the full rule.
    pub fn accepts(&self, status: StatusCode) -> bool {
        self.range
            .map(|range| range.contains(status.as_u16()))
            .unwrap_or(false)
    }

    /// Decide the fate of a response with the given final status.
    pub fn decide(&self, status: StatusCode) -> Decision {
        if !self.is_enabled() || self.accepts(status) {
            Decision::Drop
        } else {
            Decision::Deliver
        }
    }
}

impl fmt::Display for StatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range {
            Some(range) => write!(f, "drop {}", range),
            None => write!(f, "drop all"),
        }
    }
}

fn parse_bound(bound: Bound, token: &str) -> Result<i64, ConfigurationError> {
    token
        .parse::<i64>()
        .map_err(|source| ConfigurationError::InvalidBound {
            bound,
            token: token.to_string(),
            source,
        })
}
