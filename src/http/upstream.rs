//! Upstream forwarding.
//!
//! The handler behind the gate: every request is sent as-is to the single
//! configured upstream and its response is returned streaming. The gate does
//! the buffering.

use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::UpstreamConfig;

/// State shared by the forwarding handler.
#[derive(Clone)]
pub struct UpstreamState {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl UpstreamState {
    pub fn new(config: &UpstreamConfig) -> Result<Self, InvalidUri> {
        let authority = Authority::from_str(&config.address)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self { client, authority })
    }

    /// Rewrite `uri` to point at the upstream, keeping path and query.
    fn upstream_uri(&self, uri: &Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
    }
}

/// Router forwarding every path and method upstream.
pub fn router(state: UpstreamState) -> Router {
    Router::new()
        .route("/", any(forward_handler))
        .route("/{*path}", any(forward_handler))
        .with_state(state)
}

async fn forward_handler(State(state): State<UpstreamState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();
    parts.uri = state.upstream_uri(&parts.uri);

    tracing::debug!(
        method = %parts.method,
        uri = %parts.uri,
        "Forwarding request upstream"
    );

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %state.authority, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
