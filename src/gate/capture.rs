//! Buffering capture of an upstream response.

use axum::body::{Body, Bytes, HttpBody};
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode};
use axum::BoxError;

use crate::gate::error::GateError;

/// Records everything the upstream writes. Nothing is forwarded until the
/// capture is replayed with [`CaptureSink::into_response`].
#[derive(Debug, Default)]
pub struct CaptureSink {
    recorded_status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    head: bool,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capture for the response to `request`.
    ///
    /// A HEAD response has no body to measure, so its upstream
    /// `Content-Length` is kept.
    pub fn for_request<B>(request: &Request<B>) -> Self {
        Self {
            head: request.method() == Method::HEAD,
            ..Self::default()
        }
    }

    /// Record a status. Later writes overwrite earlier ones.
    pub fn write_status(&mut self, status: StatusCode) {
        self.recorded_status = Some(status);
    }

    /// Append body bytes.
    pub fn write_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// Final status, 200 OK when none was written.
    pub fn status(&self) -> StatusCode {
        self.recorded_status.unwrap_or(StatusCode::OK)
    }

    /// Whether a status was ever written.
    pub fn has_status(&self) -> bool {
        self.recorded_status.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drain an upstream response into the capture.
    ///
    /// Framing and connection headers are dropped; the replay carries the
    /// complete body over the client's own connection. `Content-Length`
    /// survives for HEAD.
    /// Fails when the body errors or exceeds `limit` bytes.
    pub async fn record<B>(&mut self, response: Response<B>, limit: usize) -> Result<(), GateError>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = response.into_parts();
        self.write_status(parts.status);

        let mut headers = parts.headers;
        if !self.head {
            headers.remove(header::CONTENT_LENGTH);
        }
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONNECTION);
        self.headers.extend(headers);

        let bytes = axum::body::to_bytes(Body::new(body), limit)
            .await
            .map_err(GateError::UpstreamBody)?;
        self.write_body(&bytes);

        Ok(())
    }

    /// Consume the capture into the response replayed to the client.
    pub fn into_response(self) -> Response<Body> {
        let status = self.status();
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}
