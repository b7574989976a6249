//! Live Connection Registry
//!
//! Every accepted connection gets a [`ClientHandle`]: an id, the peer
//! address, a bounded outbound queue for pub/sub pushes and a close signal.
//! The registry owns one `Arc` of each handle so the server can close every
//! connection at shutdown and wait for the handlers to drain.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch, Notify};
use tracing::debug;

/// Capacity of each connection's outbound push queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Unique id of a connection within one server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to one live connection.
#[derive(Debug)]
pub struct ClientHandle {
    id: ConnectionId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    closed: watch::Sender<bool>,
}

/// Receiving ends owned by the connection's handler task.
#[derive(Debug)]
pub struct ClientInbox {
    /// Framed pub/sub pushes waiting to be written
    pub messages: mpsc::Receiver<Bytes>,
    /// Flips to `true` when the server wants the connection closed
    pub closed: watch::Receiver<bool>,
}

impl ClientHandle {
    fn new(id: ConnectionId, addr: SocketAddr) -> (Arc<Self>, ClientInbox) {
        let (outbound, messages) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (closed, closed_rx) = watch::channel(false);
        let handle = Arc::new(Self {
            id,
            addr,
            outbound,
            closed,
        });
        (
            handle,
            ClientInbox {
                messages,
                closed: closed_rx,
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues an already-framed message for delivery.
    ///
    /// Never waits: returns `false` if the queue is full or the handler has
    /// gone away.
    pub fn push(&self, frame: Bytes) -> bool {
        self.outbound.try_send(frame).is_ok()
    }

    /// Asks the handler to close the connection at its next suspension point.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    clients: HashMap<ConnectionId, Arc<ClientHandle>>,
    closing: bool,
}

/// Set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
    emptied: Notify,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection.
    ///
    /// Once [`close_all`](Self::close_all) has run, new handles come back
    /// already closed so a connection racing shutdown exits immediately.
    pub fn register(&self, addr: SocketAddr) -> (Arc<ClientHandle>, ClientInbox) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (handle, inbox) = ClientHandle::new(id, addr);

        let mut state = self.lock();
        if state.closing {
            handle.close();
        }
        state.clients.insert(id, Arc::clone(&handle));
        (handle, inbox)
    }

    /// Removes a connection. Returns `false` if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let mut state = self.lock();
        let removed = state.clients.remove(&id).is_some();
        if state.clients.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Signals every registered connection to close and marks the registry
    /// as closing. Returns how many connections were signalled.
    pub fn close_all(&self) -> usize {
        let mut state = self.lock();
        state.closing = true;
        for client in state.clients.values() {
            client.close();
        }
        debug!(connections = state.clients.len(), "Closing all connections");
        state.clients.len()
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once no connections remain registered.
    pub async fn wait_until_empty(&self) {
        loop {
            let emptied = self.emptied.notified();
            if self.is_empty() {
                return;
            }
            emptied.await;
        }
    }
}
