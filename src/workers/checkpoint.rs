use super::{WorkerError, WorkerHandle};
use crate::config::CheckpointConfig;
use crate::error::ConfigError;
use crate::store::{Snapshot, WindowStore};
use parking_lot::Mutex;
use tokio::time::interval;
use tracing::{error, info};

/// Destination for periodic checkpoints (database row, file, object store...)
pub trait SnapshotSink: Send + Sync + 'static {
    fn persist(&self, snapshot: &Snapshot) -> Result<(), WorkerError>;
}

/// Sink that keeps the latest checkpoint in memory
#[derive(Default)]
pub struct InMemorySink {
    latest: Mutex<Option<Vec<u8>>>,
    writes: Mutex<u64>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded bytes of the most recent checkpoint
    pub fn latest(&self) -> Option<Vec<u8>> {
        self.latest.lock().clone()
    }

    pub fn writes(&self) -> u64 {
        *self.writes.lock()
    }
}

impl SnapshotSink for InMemorySink {
    fn persist(&self, snapshot: &Snapshot) -> Result<(), WorkerError> {
        let bytes = snapshot
            .to_bytes()
            .map_err(|e| WorkerError::Sink(e.to_string()))?;
        *self.latest.lock() = Some(bytes);
        *self.writes.lock() += 1;
        Ok(())
    }
}

impl<S: SnapshotSink> SnapshotSink for std::sync::Arc<S> {
    fn persist(&self, snapshot: &Snapshot) -> Result<(), WorkerError> {
        (**self).persist(snapshot)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    pub checkpoints: u64,
    pub failures: u64,
}

/// Serializes the store every `interval_ms` and hands the snapshot to the
/// sink. A failed write is logged and retried at the next tick. One last
/// checkpoint is taken on shutdown.
pub struct CheckpointWorker<S: SnapshotSink> {
    store: WindowStore,
    sink: S,
    config: CheckpointConfig,
    handle: WorkerHandle,
    stats: CheckpointStats,
}

impl<S: SnapshotSink> CheckpointWorker<S> {
    pub fn new(
        store: WindowStore,
        sink: S,
        config: CheckpointConfig,
    ) -> Result<(Self, WorkerHandle), ConfigError> {
        config.validate()?;
        let handle = WorkerHandle::new();
        let worker = CheckpointWorker {
            store,
            sink,
            config,
            handle: handle.clone(),
            stats: CheckpointStats::default(),
        };
        Ok((worker, handle))
    }

    pub async fn run(mut self) -> CheckpointStats {
        let mut tick = interval(self.config.interval());
        // First tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => self.checkpoint(),
                _ = self.handle.wait() => {
                    self.checkpoint();
                    break;
                }
            }
        }

        info!(
            checkpoints = self.stats.checkpoints,
            failures = self.stats.failures,
            "checkpoint worker stopped"
        );
        self.stats
    }

    fn checkpoint(&mut self) {
        let snapshot = self.store.serialize();
        match self.sink.persist(&snapshot) {
            Ok(()) => {
                self.stats.checkpoints += 1;
                info!(
                    subjects = snapshot.subject_count(),
                    windows = snapshot.window_count(),
                    "checkpoint written"
                );
            }
            Err(e) => {
                self.stats.failures += 1;
                error!("checkpoint failed: {}", e);
            }
        }
    }
}
