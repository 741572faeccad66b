//! Background workers around a [`WindowStore`](crate::store::WindowStore)
//!
//! - [`IngestWorker`]: applies events sent through [`EventSender`] handles,
//!   decoupling producers from the store
//! - [`CheckpointWorker`]: periodically hands a snapshot to a
//!   [`SnapshotSink`] owned by the persistence layer

mod checkpoint;
mod ingest;

pub use checkpoint::{CheckpointStats, CheckpointWorker, InMemorySink, SnapshotSink};
pub use ingest::{event_channel, EventReceiver, EventSender, IngestStats, IngestWorker};

use std::sync::Arc;
use tokio::sync::Notify;

/// Error type for worker channel and sink operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Channel is disconnected
    Disconnected,
    /// Snapshot sink refused or failed to store a checkpoint
    Sink(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Disconnected => write!(f, "event channel disconnected"),
            WorkerError::Sink(msg) => write!(f, "snapshot sink error: {}", msg),
        }
    }
}

impl std::error::Error for WorkerError {}

/// Handle for stopping a worker
#[derive(Clone, Default)]
pub struct WorkerHandle {
    shutdown: Arc<Notify>,
}

impl WorkerHandle {
    fn new() -> Self {
        Self::default()
    }

    /// Signal the worker to finish its current pass and stop
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn wait(&self) {
        self.shutdown.notified().await;
    }
}
