//! The intercepting gate as a tower middleware.
//!
//! # Request State Machine
//! ```text
//! START → BUFFERING (upstream call) → DECIDING
//!       → REPLAYED | TERMINATED | TERMINATION_FAILED → ERROR_RESPONSE
//!       → DONE
//! ```
//! A disabled policy skips straight from START to termination.

use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes, HttpBody};
use axum::http::{Request, Response, StatusCode};
use axum::BoxError;
use futures_util::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

use crate::gate::capture::CaptureSink;
use crate::gate::policy::{Decision, StatusPolicy};
use crate::gate::sink::Sink;
use crate::observability::metrics;

/// Upper bound on buffered upstream bodies when none is configured.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 2 * 1024 * 1024;

/// How a request left the gate.
#[derive(Debug)]
pub enum Outcome {
    /// The captured response is to be written to the client.
    Replayed(Response<Body>),
    /// The connection was closed; nothing may be written.
    Terminated,
    /// No capture is delivered; the gate answers with a bare error status.
    Fallback(Response<Body>),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Replayed(_) => "delivered",
            Outcome::Terminated => "dropped",
            Outcome::Fallback(_) => "fallback",
        }
    }
}

/// Run one request through the gate.
///
/// The upstream is called at most once, and never when the policy is disabled.
/// The body is only buffered when the status is to be delivered; if buffering
/// fails the 502 fallback is judged by the policy like any other status.
pub async fn handle<S, ReqBody, ResBody>(
    policy: &StatusPolicy,
    request: Request<ReqBody>,
    upstream: S,
    max_buffered_bytes: usize,
) -> Result<Outcome, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let sink = Sink::from_request(&request);

    if !policy.is_enabled() {
        tracing::debug!("No status range configured, dropping connection");
        return Ok(terminate(sink));
    }

    let mut capture = CaptureSink::for_request(&request);
    let response = upstream.oneshot(request).await?;

    // The status is final once the head arrives; dropped responses are never buffered.
    let status = response.status();
    if policy.decide(status) == Decision::Drop {
        tracing::debug!(status = %status, policy = %policy, "Status in range, dropping connection");
        return Ok(terminate(sink));
    }

    if let Err(err) = capture.record(response, max_buffered_bytes).await {
        let fallback = StatusCode::BAD_GATEWAY;
        tracing::warn!(error = %err, "Upstream response not captured");
        if policy.decide(fallback) == Decision::Drop {
            tracing::debug!(status = %fallback, policy = %policy, "Fallback status in range, dropping connection");
            return Ok(terminate(sink));
        }
        return Ok(Outcome::Fallback(bare_response(fallback)));
    }

    tracing::debug!(
        status = %status,
        body_bytes = capture.body().len(),
        "Status outside range, replaying response"
    );
    sink.note_replay();
    Ok(Outcome::Replayed(capture.into_response()))
}

fn terminate(sink: Sink) -> Outcome {
    match sink.terminate() {
        Ok(connection_id) => {
            tracing::debug!(connection_id = %connection_id, "Connection terminated");
            Outcome::Terminated
        }
        Err(err) => {
            tracing::warn!(error = %err, "Connection not terminated, answering 500");
            Outcome::Fallback(bare_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn bare_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Layer applying the gate to an upstream service.
#[derive(Debug, Clone)]
pub struct DropConnectionLayer {
    policy: Arc<ArcSwap<StatusPolicy>>,
    max_buffered_bytes: usize,
}

impl DropConnectionLayer {
    /// Gate with a fixed policy.
    pub fn new(policy: StatusPolicy) -> Self {
        Self::shared(Arc::new(ArcSwap::from_pointee(policy)))
    }

    /// Gate reading its policy from a swappable slot, so a reload applies to
    /// every request that starts afterwards.
    pub fn shared(policy: Arc<ArcSwap<StatusPolicy>>) -> Self {
        Self {
            policy,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
        }
    }

    pub fn max_buffered_bytes(mut self, limit: usize) -> Self {
        self.max_buffered_bytes = limit;
        self
    }
}

impl<S> Layer<S> for DropConnectionLayer {
    type Service = DropConnection<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DropConnection {
            inner,
            policy: Arc::clone(&self.policy),
            max_buffered_bytes: self.max_buffered_bytes,
        }
    }
}

/// Gate middleware. See [`handle`].
///
/// When the connection is terminated the response future never completes;
/// the host drops it along with the connection.
#[derive(Debug, Clone)]
pub struct DropConnection<S> {
    inner: S,
    policy: Arc<ArcSwap<StatusPolicy>>,
    max_buffered_bytes: usize,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DropConnection<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.load_full();
        let limit = self.max_buffered_bytes;

        Box::pin(async move {
            let outcome = handle(&policy, request, inner, limit).await?;
            metrics::record_outcome(outcome.label());

            match outcome {
                Outcome::Replayed(response) | Outcome::Fallback(response) => Ok(response),
                Outcome::Terminated => std::future::pending().await,
            }
        })
    }
}
