//! Periodic Flush Task
//!
//! Persists the index to its backing file on a fixed interval, and once more
//! when asked to shut down.
//!
//! The flush itself ([`StorageEngine::flush`]) does blocking file I/O, so the
//! task runs it on Tokio's blocking pool. A failed flush is logged and the
//! loop keeps going; the index stays dirty and the next tick retries.
//!
//! Worst case on a crash, the file is one interval behind memory. A clean
//! shutdown loses nothing: [`PeriodicFlusher::shutdown`] waits for the final
//! flush and hands back its outcome.

use crate::storage::engine::Flushed;
use crate::storage::error::StorageResult;
use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Configuration for the periodic flusher.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Interval between flushes (default: 60s)
    pub interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// A handle to the running flush task.
///
/// Dropping the handle signals the task, which still performs its final
/// flush if the runtime keeps running.
#[derive(Debug)]
pub struct PeriodicFlusher {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<StorageResult<Flushed>>>,
    engine: Arc<StorageEngine>,
}

impl PeriodicFlusher {
    /// Starts the flush task. Must be called from within a Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: FlushConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(flusher_loop(Arc::clone(&engine), config.clone(), shutdown_rx));

        info!(
            interval_ms = config.interval.as_millis() as u64,
            path = %engine.path().display(),
            "Periodic flusher started"
        );

        Self {
            shutdown_tx,
            task: Some(task),
            engine,
        }
    }

    /// Signals the task to do its final flush and stop, without waiting.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the task and returns the outcome of the final flush.
    pub async fn shutdown(mut self) -> StorageResult<Flushed> {
        self.stop();

        let result = match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before flushing; do it here instead.
                    error!(error = %e, "Flush task failed, flushing inline");
                    self.engine.flush()
                }
            },
            None => self.engine.flush(),
        };

        info!("Periodic flusher stopped");
        result
    }
}

impl Drop for PeriodicFlusher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn flusher_loop(
    engine: Arc<StorageEngine>,
    config: FlushConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> StorageResult<Flushed> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Flusher received shutdown signal, running final flush");
                    return flush_blocking(&engine).await;
                }
            }
        }

        // Errors are already logged; keep ticking.
        let _ = flush_blocking(&engine).await;
    }
}

/// Runs one flush on the blocking pool and logs its outcome.
pub async fn flush_blocking(engine: &Arc<StorageEngine>) -> StorageResult<Flushed> {
    let engine = Arc::clone(engine);
    let result = match tokio::task::spawn_blocking(move || engine.flush()).await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(format!("flush task panicked: {e}")).into()),
    };

    match &result {
        Ok(Flushed::Clean) => trace!("Flush skipped, nothing changed"),
        Ok(Flushed::Written { entries, bytes }) => {
            debug!(entries = *entries, bytes = *bytes, "Flushed snapshot to disk")
        }
        Err(e) => error!(error = %e, "Flush failed"),
    }

    result
}
