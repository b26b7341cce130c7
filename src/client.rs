//! Async Client
//!
//! A small client for the stashkv wire protocol. Replies with the
//! `NOTFOUND` and `EXISTS` codes come back as typed errors, so callers can
//! branch on them the same way they would on `StorageError`.
//!
//! ```ignore
//! let mut client = Client::connect("127.0.0.1:8080").await?;
//! client.add("session", "abc", "1h").await?;
//! let entry = client.get("session").await?;
//! println!("{} expires at {}", entry.value.data, entry.value.expires_at);
//! ```

use crate::commands::handler::{EXISTS, NOT_FOUND};
use crate::protocol::{parse_frame_with_limit, Frame, FrameError};
use crate::storage::{Entry, StorageError};
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Largest bulk reply accepted (16 MiB). A GET reply wraps the stored
/// value in JSON, so it can exceed the request-side bulk limit.
pub const MAX_REPLY_SIZE: usize = 16 * 1024 * 1024;

/// Errors returned by `Client`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no data was found by provided key")]
    NotFound,

    #[error("provided key already exists")]
    AlreadyExists,

    /// Any other error reply, without its leading code word
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("connection closed by server")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Frame(#[from] FrameError),

    #[error("could not decode entry: {0}")]
    Decode(#[from] StorageError),
}

/// Result type for client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// One connection to a stashkv server.
pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(4 * 1024),
        })
    }

    /// Stores a new key. An empty `ttl` uses the server default.
    pub async fn add(&mut self, key: &str, value: &str, ttl: &str) -> ClientResult<()> {
        let reply = self.call(with_ttl("ADD", key, value, ttl)).await?;
        expect_ok(reply)
    }

    /// Updates a key. Empty `value` or `ttl` leave the stored ones in place.
    pub async fn set(&mut self, key: &str, value: &str, ttl: &str) -> ClientResult<()> {
        let reply = self.call(with_ttl("SET", key, value, ttl)).await?;
        expect_ok(reply)
    }

    pub async fn get(&mut self, key: &str) -> ClientResult<Entry> {
        match self.call(vec!["GET", key]).await? {
            Frame::Bulk(json) => Ok(Entry::from_json(&json)?),
            other => Err(ClientError::UnexpectedReply(other.to_string())),
        }
    }

    pub async fn del(&mut self, key: &str) -> ClientResult<()> {
        let reply = self.call(vec!["DEL", key]).await?;
        expect_ok(reply)
    }

    /// Round-trips a PING, returning the server's reply text.
    pub async fn ping(&mut self) -> ClientResult<String> {
        match self.call(vec!["PING"]).await? {
            Frame::Simple(s) => Ok(s),
            other => Err(ClientError::UnexpectedReply(other.to_string())),
        }
    }

    /// Sends one request and waits for its reply.
    ///
    /// Error replies are turned into `ClientError`.
    async fn call(&mut self, parts: Vec<&str>) -> ClientResult<Frame> {
        let request = Frame::command(parts.into_iter().map(str::to_string));
        self.stream.write_all(&request.encode()).await?;

        match self.read_frame().await? {
            Frame::Error(message) => Err(reply_error(&message)),
            frame => Ok(frame),
        }
    }

    async fn read_frame(&mut self) -> ClientResult<Frame> {
        loop {
            if let Some((frame, consumed)) = parse_frame_with_limit(&self.buffer, MAX_REPLY_SIZE)? {
                self.buffer.advance(consumed);
                return Ok(frame);
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::Closed);
            }
        }
    }
}

fn with_ttl<'a>(name: &'a str, key: &'a str, value: &'a str, ttl: &'a str) -> Vec<&'a str> {
    if ttl.is_empty() {
        vec![name, key, value]
    } else {
        vec![name, key, value, ttl]
    }
}

fn expect_ok(reply: Frame) -> ClientResult<()> {
    match reply {
        Frame::Simple(s) if s == "OK" => Ok(()),
        other => Err(ClientError::UnexpectedReply(other.to_string())),
    }
}

fn reply_error(message: &str) -> ClientError {
    let (code, rest) = message.split_once(' ').unwrap_or((message, ""));
    match code {
        NOT_FOUND => ClientError::NotFound,
        EXISTS => ClientError::AlreadyExists,
        _ => ClientError::Server(rest.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandHandler;
    use crate::connection::{handle_connection, ConnectionStats};
    use crate::service::KvService;
    use crate::storage::StorageEngine;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn start_server(dir: &TempDir) -> SocketAddr {
        let engine = Arc::new(StorageEngine::open(dir.path().join("data.json")).unwrap());
        let stats = Arc::new(ConnectionStats::new());
        let handler = CommandHandler::new(
            KvService::new(engine, Duration::from_secs(3600)),
            Arc::clone(&stats),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, peer, handler.clone(), Arc::clone(&stats)));
            }
        });
        addr
    }

    #[test]
    fn test_reply_error_codes() {
        assert!(matches!(
            reply_error("NOTFOUND no data was found by provided key"),
            ClientError::NotFound
        ));
        assert!(matches!(
            reply_error("EXISTS provided key already exists"),
            ClientError::AlreadyExists
        ));
        assert!(matches!(
            reply_error("ERR invalid ttl 'x'"),
            ClientError::Server(msg) if msg == "invalid ttl 'x'"
        ));
    }

    #[tokio::test]
    async fn test_client_round_trip() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir).await;
        let mut client = Client::connect(addr).await.unwrap();

        assert_eq!(client.ping().await.unwrap(), "PONG");

        client.add("a", "1", "").await.unwrap();
        assert!(matches!(
            client.add("a", "2", "").await,
            Err(ClientError::AlreadyExists)
        ));

        client.set("a", "3", "2h").await.unwrap();
        let entry = client.get("a").await.unwrap();
        assert_eq!(entry.key, "a");
        assert_eq!(entry.value.data, "3");

        client.del("a").await.unwrap();
        assert!(matches!(client.get("a").await, Err(ClientError::NotFound)));
        assert!(matches!(client.del("a").await, Err(ClientError::NotFound)));
    }

    #[tokio::test]
    async fn test_client_reads_reply_larger_than_request_limit() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir).await;
        let mut client = Client::connect(addr).await.unwrap();

        // every quote is escaped in the JSON reply, doubling its size
        let value = "\"".repeat(crate::protocol::parser::MAX_BULK_SIZE);
        client.add("big", &value, "").await.unwrap();

        let entry = client.get("big").await.unwrap();
        assert_eq!(entry.value.data, value);
    }

    #[tokio::test]
    async fn test_client_bad_ttl() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir).await;
        let mut client = Client::connect(addr).await.unwrap();

        assert!(matches!(
            client.add("a", "1", "whenever").await,
            Err(ClientError::Server(_))
        ));
    }
}
