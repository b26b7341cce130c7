//! Background task lifecycle.
//!
//! [`BackgroundTasks`] owns the sweeper and flusher handles for one engine,
//! and knows the order they stop in: the sweeper first, so the final flush
//! captures its last removals, then the flusher with its final flush.

use crate::storage::engine::Flushed;
use crate::storage::error::StorageResult;
use crate::storage::expiry::{ExpiryConfig, ExpirySweeper};
use crate::storage::flusher::{FlushConfig, PeriodicFlusher};
use crate::storage::StorageEngine;
use std::sync::Arc;
use tracing::{error, info};

/// The sweeper and flusher running for one engine.
#[derive(Debug)]
pub struct BackgroundTasks {
    sweeper: ExpirySweeper,
    flusher: PeriodicFlusher,
}

impl BackgroundTasks {
    /// Starts both tasks. Must be called from within a Tokio runtime.
    pub fn start(engine: &Arc<StorageEngine>, expiry: ExpiryConfig, flush: FlushConfig) -> Self {
        Self {
            sweeper: ExpirySweeper::start(Arc::clone(engine), expiry),
            flusher: PeriodicFlusher::start(Arc::clone(engine), flush),
        }
    }

    /// Stops both tasks and returns the outcome of the final flush.
    pub async fn shutdown(self) -> StorageResult<Flushed> {
        let Self { sweeper, flusher } = self;

        sweeper.shutdown().await;
        let result = flusher.shutdown().await;

        match &result {
            Ok(Flushed::Written { entries, .. }) => {
                info!(entries = *entries, "Final flush written")
            }
            Ok(Flushed::Clean) => info!("Final flush skipped, snapshot already current"),
            Err(e) => error!(error = %e, "Final flush failed"),
        }

        result
    }
}
