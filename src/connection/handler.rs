//! Connection Handler Module
//!
//! This module handles individual client connections to LineKV.
//! Each client gets its own handler task that runs in a loop,
//! reading command lines and sending framed replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, registered with the ConnectionRegistry
//!        │
//!        ▼
//! 2. ┌──────────────────────────────────────────┐
//!    │      Main Loop (select!)                 │
//!    │                                          │
//!    │  close signal ──────────────> exit       │
//!    │  pub/sub push ──> write frame            │
//!    │  socket bytes ──> parse lines            │
//!    │                     └─> dispatch, write  │
//!    │  idle deadline ─────────────> exit       │
//!    └──────────────────────────────────────────┘
//!        │
//!        ▼
//! 3. Unsubscribe everywhere, deregister, decrement gauge
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol: a read may hold a partial line or several lines at once. The
//! parser bounds how much can pile up without a newline.

use crate::commands::CommandDispatcher;
use crate::config::ServerConfig;
use crate::connection::registry::{ClientHandle, ClientInbox};
use crate::protocol::{LineParser, ParseError};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// No reads or writes within the idle timeout
    #[error("Idle timeout")]
    IdleTimeout,

    /// A reply could not be written in time
    #[error("Write timeout")]
    WriteTimeout,

    /// The server asked the connection to close
    #[error("Closed by server")]
    ClosedByServer,
}

impl ConnectionError {
    /// True for endings that are part of normal operation.
    pub fn is_expected(&self) -> bool {
        match self {
            ConnectionError::ClientDisconnected | ConnectionError::ClosedByServer => true,
            ConnectionError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so tests can drive it with an in-memory mock.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,
    buffer: BytesMut,
    parser: LineParser,
    dispatcher: CommandDispatcher,
    client: Arc<ClientHandle>,
    inbox: ClientInbox,
    idle_timeout: Duration,
    write_timeout: Duration,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Registers a new connection and builds its handler.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        dispatcher: CommandDispatcher,
        config: &ServerConfig,
    ) -> Self {
        let (client, inbox) = dispatcher.registry().register(addr);
        dispatcher.metrics().client_connected();

        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: LineParser::with_max_line_length(config.max_line_length),
            dispatcher,
            client,
            inbox,
            idle_timeout: config.idle_timeout,
            write_timeout: config.write_timeout,
        }
    }

    /// The handle other components use to reach this connection.
    pub fn client(&self) -> &Arc<ClientHandle> {
        &self.client
    }

    /// Runs the connection to completion and cleans up after it.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let addr = self.client.addr();
        info!(client = %addr, id = %self.client.id(), "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %addr, "Client disconnected gracefully"),
            Err(ConnectionError::IdleTimeout) => {
                info!(client = %addr, "Client connection timed out")
            }
            Err(e) if e.is_expected() => debug!(client = %addr, reason = %e, "Client disconnected"),
            Err(e) => warn!(client = %addr, error = %e, "Connection error"),
        }

        // Replies are flushed frame by frame, so anything still buffered here
        // belongs to a write that already failed; shut the socket down directly.
        let _ = tokio::time::timeout(self.write_timeout, self.stream.get_mut().shutdown()).await;

        let id = self.client.id();
        self.dispatcher.pubsub().remove_client(id);
        self.dispatcher.registry().deregister(id);
        self.dispatcher.metrics().client_disconnected();

        result
    }

    /// The read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut deadline = Instant::now() + self.idle_timeout;

        loop {
            while let Some(tokens) = self.try_parse_line()? {
                let reply = self.dispatcher.dispatch(&tokens, &self.client).await;
                self.write_frame(&reply.serialize()).await?;
                deadline = Instant::now() + self.idle_timeout;
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            tokio::select! {
                biased;

                _ = self.inbox.closed.changed() => {
                    return Err(ConnectionError::ClosedByServer);
                }
                Some(frame) = self.inbox.messages.recv() => {
                    self.write_frame(&frame).await?;
                    deadline = Instant::now() + self.idle_timeout;
                }
                read = self.stream.get_mut().read_buf(&mut self.buffer) => {
                    let n = read?;
                    if n == 0 {
                        if !self.buffer.is_empty() {
                            debug!(
                                client = %self.client.addr(),
                                discarded = self.buffer.len(),
                                "Partial line at end of stream"
                            );
                        }
                        return Err(ConnectionError::ClientDisconnected);
                    }
                    trace!(client = %self.client.addr(), bytes = n, "Read data");
                    deadline = Instant::now() + self.idle_timeout;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ConnectionError::IdleTimeout);
                }
            }
        }
    }

    fn try_parse_line(&mut self) -> Result<Option<Vec<String>>, ConnectionError> {
        match self.parser.parse(&mut self.buffer) {
            Ok(tokens) => Ok(tokens),
            Err(e) => {
                warn!(client = %self.client.addr(), error = %e, "Parse error");
                Err(ConnectionError::Parse(e))
            }
        }
    }

    /// Writes one framed reply, bounded by the write timeout.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ConnectionError> {
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(frame).await?;
            stream.flush().await
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::WriteTimeout),
        }

        trace!(client = %self.client.addr(), bytes = frame.len(), "Sent reply");
        Ok(())
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion; the outcome is already logged.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    dispatcher: CommandDispatcher,
    config: Arc<ServerConfig>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, dispatcher, &config);
    let _ = handler.run().await;
}
