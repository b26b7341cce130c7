//! Command Handler
//!
//! Executes parsed commands against the `KvService` and builds the reply
//! frame. Domain errors carry their own reply code so clients can tell them
//! apart without matching on message text:
//!
//! | Failure                       | Reply                                        |
//! |-------------------------------|----------------------------------------------|
//! | key not found                 | `-NOTFOUND no data was found by provided key` |
//! | key already exists            | `-EXISTS provided key already exists`        |
//! | bad request (arity, TTL, key) | `-ERR <reason>`                              |
//! | encoding or I/O failure       | `-ERR internal server error`                 |
//!
//! Internal failures are logged with their detail and never echoed to the
//! client.

use crate::commands::command::{Command, CommandError};
use crate::connection::ConnectionStats;
use crate::protocol::Frame;
use crate::service::{KvService, ServiceError};
use crate::storage::flusher::flush_blocking;
use crate::storage::{Flushed, StorageError};
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Reply code for a missing key
pub const NOT_FOUND: &str = "NOTFOUND";

/// Reply code for a key that is already present
pub const EXISTS: &str = "EXISTS";

/// Message sent in place of internal error detail
pub const INTERNAL_ERROR: &str = "internal server error";

/// Executes commands on behalf of every connection.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    service: KvService,
    connections: Arc<ConnectionStats>,
    started: Instant,
}

impl CommandHandler {
    pub fn new(service: KvService, connections: Arc<ConnectionStats>) -> Self {
        Self {
            service,
            connections,
            started: Instant::now(),
        }
    }

    pub fn service(&self) -> &KvService {
        &self.service
    }

    /// Parses and executes one request frame.
    pub async fn execute(&self, frame: Frame) -> Frame {
        match Command::from_frame(frame) {
            Ok(command) => self.run(command).await,
            Err(e) => Self::reject(e),
        }
    }

    /// Reply for a request that did not parse into a command.
    pub fn reject(e: CommandError) -> Frame {
        Frame::error(format!("ERR {}", e))
    }

    /// Executes a parsed command.
    pub async fn run(&self, command: Command) -> Frame {
        let name = command.name();
        let start = Instant::now();

        let reply = match command {
            Command::Add { key, value, ttl } => self.ok_or_error(name, self.service.add(&key, &value, &ttl)),
            Command::Set { key, value, ttl } => self.ok_or_error(name, self.service.set(&key, &value, &ttl)),
            Command::Get { key } => self.get(&key),
            Command::Del { key } => self.ok_or_error(name, self.service.delete(&key)),
            Command::Ping(None) => Frame::pong(),
            Command::Ping(Some(msg)) => Frame::Bulk(msg),
            Command::DbSize => Frame::Integer(self.service.engine().len() as i64),
            Command::Save => self.save().await,
            Command::Info => Frame::Bulk(Bytes::from(self.info())),
            Command::Quit => Frame::ok(),
        };

        debug!(
            command = name,
            elapsed_us = start.elapsed().as_micros() as u64,
            error = reply.is_error(),
            "Command executed"
        );
        reply
    }

    fn get(&self, key: &str) -> Frame {
        let entry = match self.service.get(key) {
            Ok(entry) => entry,
            Err(e) => return service_error("GET", e),
        };

        match entry.to_json() {
            Ok(json) => Frame::bulk(json),
            Err(e) => service_error("GET", e.into()),
        }
    }

    async fn save(&self) -> Frame {
        match flush_blocking(self.service.engine()).await {
            Ok(Flushed::Clean) => Frame::ok(),
            Ok(Flushed::Written { entries, bytes }) => {
                info!(entries, bytes, "Snapshot saved on request");
                Frame::ok()
            }
            Err(e) => service_error("SAVE", e.into()),
        }
    }

    fn ok_or_error(&self, name: &'static str, result: Result<(), ServiceError>) -> Frame {
        match result {
            Ok(()) => Frame::ok(),
            Err(e) => service_error(name, e),
        }
    }

    fn info(&self) -> String {
        let storage = self.service.engine().stats();
        let connections = &self.connections;

        format!(
            "# Server\r\n\
             stashkv_version:{}\r\n\
             uptime_in_seconds:{}\r\n\
             data_file:{}\r\n\
             \r\n\
             # Clients\r\n\
             connections_accepted:{}\r\n\
             connections_active:{}\r\n\
             commands_processed:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             keys:{}\r\n\
             dirty:{}\r\n\
             \r\n\
             # Operations\r\n\
             creates:{}\r\n\
             reads:{}\r\n\
             updates:{}\r\n\
             deletes:{}\r\n\
             expired_keys:{}\r\n\
             \r\n\
             # Persistence\r\n\
             flushes:{}\r\n\
             flush_failures:{}\r\n",
            crate::VERSION,
            self.started.elapsed().as_secs(),
            self.service.engine().path().display(),
            connections.connections_accepted.load(Ordering::Relaxed),
            connections.active_connections.load(Ordering::Relaxed),
            connections.commands_processed.load(Ordering::Relaxed),
            storage.keys,
            self.service.engine().is_dirty() as u8,
            storage.creates,
            storage.reads,
            storage.updates,
            storage.deletes,
            storage.expired,
            storage.flushes,
            storage.flush_failures,
        )
    }
}

/// Maps a service failure to its reply frame.
fn service_error(command: &'static str, e: ServiceError) -> Frame {
    match e {
        ServiceError::Storage(StorageError::KeyNotFound) => {
            Frame::error(format!("{} {}", NOT_FOUND, StorageError::KeyNotFound))
        }
        ServiceError::Storage(StorageError::KeyAlreadyExists) => {
            Frame::error(format!("{} {}", EXISTS, StorageError::KeyAlreadyExists))
        }
        e if e.is_client_error() => Frame::error(format!("ERR {}", e)),
        ServiceError::Storage(e) if e.is_encoding() => {
            error!(command, error = %e, "Stored data could not be encoded or decoded");
            Frame::error(format!("ERR {}", INTERNAL_ERROR))
        }
        e => {
            error!(command, error = %e, "Command failed");
            Frame::error(format!("ERR {}", INTERNAL_ERROR))
        }
    }
}
