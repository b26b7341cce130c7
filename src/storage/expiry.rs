//! Expiration Sweeper
//!
//! A Tokio task that wakes up on a fixed interval and removes every entry
//! whose expiry has passed.
//!
//! ## Pass
//!
//! Each pass:
//! 1. Sleeps for the configured interval (default: 10s)
//! 2. Takes the index's exclusive lock
//! 3. Captures `now` once and drops every entry that expired strictly before it
//! 4. Releases the lock and logs the removed keys (never their values)
//!
//! Deletion happens inline while the lock is held, so a concurrent read
//! either sees the entry or gets `KeyNotFound`; it never sees a
//! half-swept index.
//!
//! ## States
//!
//! ```text
//!   Idle ──(tick)──► Scanning ──(done)──► Idle
//!     │
//!     └──(shutdown signal)──► task ends
//! ```

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sweep cadence.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeps (default: 10s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Owns the sweep task; dropping it signals the task to exit.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the sweep task on the current Tokio runtime.
    ///
    /// ```ignore
    /// let engine = Arc::new(StorageEngine::open("data.json")?);
    /// let sweeper = ExpirySweeper::start(Arc::clone(&engine), ExpiryConfig::default());
    /// // ... serve traffic ...
    /// sweeper.shutdown().await;
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(sweeper_loop(engine, config.clone(), shutdown_rx));

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Expiration sweeper started"
        );

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the task without waiting for it. Also run on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals the task and waits until it has exited. A pass that is
    /// already running finishes first.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Expiration sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiration sweeper shutting down");
                    return;
                }
            }
        }

        sweep_once(&engine);
    }
}

/// Runs one sweep pass and logs what it found.
///
/// Returns the number of removed keys.
pub fn sweep_once(engine: &StorageEngine) -> usize {
    debug!(keys = engine.len(), "Expiry sweep started");

    let removed = engine.sweep_expired();

    for key in &removed {
        info!(key = %key, "Expired key removed");
    }

    if removed.is_empty() {
        debug!("Expiry sweep ended, nothing expired");
    } else {
        info!(
            expired = removed.len(),
            keys_remaining = engine.len(),
            "Expiry sweep ended"
        );
    }

    removed.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Entry, StorageError};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_engine(dir: &TempDir) -> Arc<StorageEngine> {
        Arc::new(StorageEngine::open(dir.path().join("data.json")).unwrap())
    }

    fn create(engine: &StorageEngine, key: &str, ttl: chrono::Duration) {
        let now = Utc::now();
        engine
            .create(Entry::from_parts(key, "value", now, now + ttl))
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        for i in 0..10 {
            create(&engine, &format!("key{}", i), chrono::Duration::milliseconds(30));
        }
        create(&engine, "long-lived", chrono::Duration::hours(1));

        assert_eq!(engine.len(), 11);

        let config = ExpiryConfig {
            interval: Duration::from_millis(20),
        };
        let sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.shutdown().await;

        assert_eq!(engine.len(), 1);
        assert!(engine.read("long-lived").is_ok());
        assert_eq!(engine.stats().expired, 10);
    }

    #[tokio::test]
    async fn test_already_expired_gone_after_one_cycle() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        create(&engine, "k", chrono::Duration::seconds(-1));

        let config = ExpiryConfig {
            interval: Duration::from_millis(10),
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(engine.read("k"), Err(StorageError::KeyNotFound)));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        let config = ExpiryConfig {
            interval: Duration::from_millis(10),
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        create(&engine, "key", chrono::Duration::milliseconds(10));

        // Nothing sweeps anymore, and reads do not expire lazily
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(engine.read("key").is_ok());
        assert_eq!(sweep_once(&engine), 1);
        assert!(engine.read("key").is_err());
    }

    #[tokio::test]
    async fn test_sweep_marks_engine_dirty() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        create(&engine, "k", chrono::Duration::seconds(-1));
        engine.flush().unwrap();
        assert!(!engine.is_dirty());

        assert_eq!(sweep_once(&engine), 1);
        assert!(engine.is_dirty());
    }
}
