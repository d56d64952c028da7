//! Response sink capabilities.
//!
//! The real sink of a request is the response returned to the server plus,
//! when the host can give it up, the connection underneath. The host signals
//! the latter by inserting a [`HijackHandle`] into the request extensions.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::http::Request;
use tokio::sync::oneshot;

use crate::gate::error::GateError;
use crate::net::connection::ConnectionId;

/// The real sink of one request.
#[derive(Debug, Clone)]
pub enum Sink {
    /// Only ordinary response writes are possible.
    Plain,
    /// The underlying connection can be relinquished.
    Hijackable(HijackHandle),
}

impl Sink {
    /// Inspect a request for the hijack capability.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        match request.extensions().get::<HijackHandle>() {
            Some(handle) => Sink::Hijackable(handle.clone()),
            None => Sink::Plain,
        }
    }

    /// Record that a captured response is about to be written to this sink.
    pub fn note_replay(&self) {
        if let Sink::Hijackable(handle) = self {
            handle.replayed.store(true, Ordering::Relaxed);
        }
    }

    /// Take the raw connection and close it.
    ///
    /// Consumes the sink; a request terminates at most once.
    pub fn terminate(self) -> Result<ConnectionId, GateError> {
        match self {
            Sink::Plain => Err(GateError::TerminationUnsupported),
            Sink::Hijackable(handle) => {
                let raw = handle.hijack()?;
                let id = raw.id();
                raw.close()?;
                Ok(id)
            }
        }
    }
}

/// Per-connection capability to take over the raw connection.
///
/// Cloned into every request on the connection; only the first
/// [`HijackHandle::hijack`] succeeds.
#[derive(Debug, Clone)]
pub struct HijackHandle {
    id: ConnectionId,
    close_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    replayed: Arc<AtomicBool>,
}

impl HijackHandle {
    /// Create the handle for a connection and the signal its task waits on.
    pub fn new(id: ConnectionId) -> (Self, CloseSignal) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            id,
            close_tx: Arc::new(Mutex::new(Some(tx))),
            replayed: Arc::new(AtomicBool::new(false)),
        };
        (handle, CloseSignal { rx })
    }

    /// Connection this handle belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether any request on this connection replayed a captured response.
    pub fn has_replayed(&self) -> bool {
        self.replayed.load(Ordering::Relaxed)
    }

    /// Relinquish the connection. Fails if it was taken before.
    pub fn hijack(&self) -> Result<RawConnection, GateError> {
        let tx = self
            .close_tx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(GateError::AlreadyHijacked(self.id))?;

        Ok(RawConnection { id: self.id, tx })
    }
}

/// Ownership of a hijacked connection. Dropping it without closing leaves the
/// connection to the host.
#[derive(Debug)]
pub struct RawConnection {
    id: ConnectionId,
    tx: oneshot::Sender<()>,
}

impl RawConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Close the connection without writing anything further.
    pub fn close(self) -> Result<(), GateError> {
        let id = self.id;
        self.tx.send(()).map_err(|_| GateError::Termination(id))
    }
}

/// Resolves once the connection has been hijacked and closed.
///
/// Also resolves if the handle is dropped after a hijack without a close.
#[derive(Debug)]
pub struct CloseSignal {
    rx: oneshot::Receiver<()>,
}

impl CloseSignal {
    /// Non-blocking check used outside of a select loop.
    pub fn is_closed(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

impl Future for CloseSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
