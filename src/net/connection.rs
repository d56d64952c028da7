//! Connection lifecycle and HTTP/1.1 serving.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track live connections for graceful shutdown
//! - Hand every request the connection's hijack capability
//! - Drop the connection untouched once the gate closes it

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

use crate::gate::{GateError, HijackHandle};
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The per-connection request pipeline.
pub type ConnectionService = BoxCloneSyncService<Request<Incoming>, Response<Body>, Infallible>;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed.
    pub async fn wait_for_shutdown(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Serve HTTP/1.1 on one accepted stream until it ends, the gate closes it,
/// or shutdown drains it.
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    app: ConnectionService,
    guard: ConnectionGuard,
    mut shutdown: broadcast::Receiver<()>,
) {
    let connection_id = guard.id();
    let (handle, mut close_signal) = HijackHandle::new(connection_id);
    let replays = handle.clone();

    let service = ServiceBuilder::new()
        .map_request(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(handle.clone());
            request
        })
        .service(app);

    let connection = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            // The close signal wins over any progress the connection could make.
            biased;

            _ = &mut close_signal => {
                tracing::debug!(
                    connection_id = %connection_id,
                    peer_addr = %peer,
                    "Connection closed by gate"
                );
                break;
            }
            result = connection.as_mut() => {
                if let Err(err) = result {
                    log_connection_error(connection_id, peer, err, replays.has_replayed());
                }
                break;
            }
            _ = shutdown.recv(), if !draining => {
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Whether a connection error happened while writing a replayed response.
///
/// Malformed requests and header timeouts fail on the read side even after an
/// earlier replay on the same connection.
fn is_replay_write_error(err: &hyper::Error, replayed: bool) -> bool {
    replayed && !err.is_parse() && !err.is_timeout()
}

fn log_connection_error(connection_id: ConnectionId, peer: SocketAddr, err: hyper::Error, replayed: bool) {
    if is_replay_write_error(&err, replayed) {
        tracing::warn!(
            connection_id = %connection_id,
            peer_addr = %peer,
            error = %GateError::ReplayWrite(err),
            "Replay not delivered"
        );
    } else {
        tracing::debug!(
            connection_id = %connection_id,
            peer_addr = %peer,
            error = %err,
            "Connection ended with error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert_eq!(id1.to_string(), format!("conn-{}", id1.as_u64()));
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn malformed_request_is_not_a_replay_error() {
        use tokio::io::AsyncWriteExt;

        let (mut client, server) = tokio::io::duplex(1024);
        let connection = http1::Builder::new().serve_connection(
            TokioIo::new(server),
            hyper::service::service_fn(|_req: Request<Incoming>| async {
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }),
        );

        client.write_all(b"\x01\x02\r\n\r\n").await.unwrap();
        let err = connection.await.unwrap_err();

        assert!(err.is_parse());
        assert!(!is_replay_write_error(&err, true));
        assert!(!is_replay_write_error(&err, false));
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_when_idle() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_shutdown().await })
        };
        drop(guard);

        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
