//! # stashkv
//!
//! A durable single-node key-value store. Every key maps to a string value
//! with an update timestamp and an absolute expiry. All entries live in an
//! in-memory index; a background flusher writes the whole index to a JSON
//! snapshot file, and a sweeper removes entries whose expiry has passed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                              stashkv                               │
//! │                                                                    │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌───────────┐  │
//! │  │ TCP accept │──>│ Connection │──>│  Command   │──>│ KvService │  │
//! │  │  (main.rs) │   │  (frames)  │   │  Handler   │   │ (TTL, key)│  │
//! │  └────────────┘   └────────────┘   └────────────┘   └─────┬─────┘  │
//! │                                                           │        │
//! │                                                           ▼        │
//! │  ┌──────────────┐          ┌──────────────────────────────────┐    │
//! │  │ExpirySweeper │─────────>│          StorageEngine           │    │
//! │  └──────────────┘          │  Index: RwLock<HashMap> + dirty  │    │
//! │  ┌──────────────┐          └────────────────┬─────────────────┘    │
//! │  │PeriodicFlush │──────────────────────────>│ SnapshotFile (JSON)  │
//! │  └──────────────┘                                                  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use stashkv::storage::{BackgroundTasks, Entry, StorageEngine};
//! use stashkv::Config;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), stashkv::storage::StorageError> {
//! let config = Config::default();
//! let engine = Arc::new(StorageEngine::open(&config.data_file)?);
//! let tasks = BackgroundTasks::start(&engine, config.expiry(), config.flush());
//!
//! let now = chrono::Utc::now();
//! engine.create(Entry::from_parts("a", "1", now, now + chrono::TimeDelta::hours(1)))?;
//! assert_eq!(engine.read("a")?.value.data, "1");
//!
//! // stops both tasks and writes the final snapshot
//! tasks.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: entry model, index, snapshot file, engine, background tasks
//! - [`service`]: request-level rules (TTL syntax, defaults, empty keys)
//! - [`protocol`]: RESP frames and parser
//! - [`commands`]: command parsing and dispatch
//! - [`connection`]: per-client connection tasks
//! - [`client`]: async client used by `stashkv-cli`
//! - [`config`]: server configuration

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod service;
pub mod storage;

pub use client::{Client, ClientError};
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Frame, FrameError};
pub use service::{KvService, ServiceError};
pub use storage::{BackgroundTasks, Entry, StorageEngine, StorageError};

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
