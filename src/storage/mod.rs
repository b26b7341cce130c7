//! Storage Engine Module
//!
//! This module provides the durable core of stashkv: an in-memory index that
//! serves all traffic, a snapshot file that backs it, and the two background
//! tasks that keep them in step.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │   ┌──────────────────────┐        ┌──────────────────────┐  │
//! │   │ Index                │ flush  │ SnapshotFile         │  │
//! │   │ RwLock<HashMap>      │───────>│ data.json            │  │
//! │   │ + dirty flag         │<───────│ (atomic replace)     │  │
//! │   └──────────────────────┘ restore└──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!            ▲                               ▲
//!            │                               │
//!  ┌─────────┴─────────┐           ┌─────────┴─────────┐
//!  │  ExpirySweeper    │           │  PeriodicFlusher  │
//!  │  (Tokio task)     │           │  (Tokio task)     │
//!  └───────────────────┘           └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stashkv::storage::{Entry, StorageEngine};
//! use chrono::{Duration, Utc};
//!
//! let engine = StorageEngine::open("data.json")?;
//! let now = Utc::now();
//! engine.create(Entry::from_parts("session", "token123", now, now + Duration::hours(1)))?;
//!
//! let entry = engine.read("session")?;
//! assert_eq!(entry.value.data, "token123");
//! # Ok::<(), stashkv::storage::StorageError>(())
//! ```

pub mod engine;
pub mod entry;
pub mod error;
pub mod expiry;
pub mod flusher;
pub mod index;
pub mod snapshot;
pub mod tasks;

// Re-export commonly used types
pub use engine::{Flushed, StorageEngine, StorageStats};
pub use entry::{Entry, Patch, Value};
pub use error::{StorageError, StorageResult};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use flusher::{FlushConfig, PeriodicFlusher};
pub use snapshot::{SnapshotFile, SNAPSHOT_VERSION};
pub use tasks::BackgroundTasks;
