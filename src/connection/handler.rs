//! Per-Connection Task
//!
//! Every accepted socket gets one `Connection` running on its own tokio
//! task. Bytes accumulate in a `BytesMut`; whole frames are cut off the
//! front and answered in order, so pipelined requests in one read get
//! their replies in one batch.
//!
//! ```text
//!   read_buf ──> buffer ──> parse_frame ──> Command ──> CommandHandler
//!      ▲                        │ (None: need more)          │
//!      └────────────────────────┘                     write reply
//! ```
//!
//! The connection ends when the peer closes, after `QUIT` is answered, on
//! a malformed frame, or when a single frame outgrows the buffer cap. The
//! last two send an error reply before closing.

use crate::commands::{Command, CommandHandler};
use crate::protocol::{parse_frame, Frame, FrameError};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Largest amount of unparsed input held for one connection (64 KiB)
///
/// Must stay above [`MAX_BULK_SIZE`](crate::protocol::parser::MAX_BULK_SIZE).
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4 * 1024;

/// Counters shared by all connections.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Why a connection ended abnormally.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("request exceeds {max} bytes")]
    BufferFull { max: usize },

    #[error("connection closed mid-frame")]
    UnexpectedEof,
}

impl ConnectionError {
    /// Returns true for endings caused by the peer going away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::UnexpectedEof => true,
            ConnectionError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// State of one client connection.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    peer: SocketAddr,
    buffer: BytesMut,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();
        Self {
            stream: BufWriter::new(stream),
            peer,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            handler,
            stats,
        }
    }

    /// Serves requests until the connection ends.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.peer, "Client connected");
        let result = self.serve().await;
        self.stats.closed();

        match &result {
            Ok(()) => debug!(client = %self.peer, "Client disconnected"),
            Err(e) if e.is_disconnect() => debug!(client = %self.peer, error = %e, "Client went away"),
            Err(e) => warn!(client = %self.peer, error = %e, "Connection closed with error"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            let mut replied = false;

            while let Some(frame) = self.next_frame().await? {
                self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);

                match Command::from_frame(frame) {
                    Ok(Command::Quit) => {
                        self.write(&Frame::ok()).await?;
                        self.stream.flush().await?;
                        return Ok(());
                    }
                    Ok(command) => {
                        let reply = self.handler.run(command).await;
                        self.write(&reply).await?;
                    }
                    Err(e) => self.write(&CommandHandler::reject(e)).await?,
                }
                replied = true;
            }

            if replied {
                self.stream.flush().await?;
            }

            if !self.read_more().await? {
                return Ok(());
            }
        }
    }

    /// Cuts the next whole frame off the buffer.
    ///
    /// A malformed frame is answered with an error reply before the
    /// connection is torn down.
    async fn next_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        match parse_frame(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                trace!(client = %self.peer, consumed, remaining = self.buffer.len(), "Parsed frame");
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.peer, error = %e, "Malformed frame");
                self.write(&Frame::error(format!("ERR {}", e))).await?;
                self.stream.flush().await?;
                Err(e.into())
            }
        }
    }

    /// Reads from the socket. Returns false on a clean close.
    async fn read_more(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(client = %self.peer, buffered = self.buffer.len(), "Request too large");
            self.write(&Frame::error("ERR request too large")).await?;
            self.stream.flush().await?;
            return Err(ConnectionError::BufferFull {
                max: MAX_BUFFER_SIZE,
            });
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return if self.buffer.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        trace!(client = %self.peer, bytes = n, "Read data");
        Ok(true)
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let bytes = frame.encode();
        self.stream.write_all(&bytes).await?;
        self.stats
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Serves one accepted socket to completion.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    // run() logs how the connection ended
    let _ = Connection::new(stream, peer, handler, stats).run().await;
}
