use super::{WorkerError, WorkerHandle};
use crate::store::WindowStore;
use crate::window::ViewEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sender end - cloned into every event producer
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<ViewEvent>,
}

impl EventSender {
    pub fn send(&self, event: ViewEvent) -> Result<(), WorkerError> {
        self.sender
            .send(event)
            .map_err(|_| WorkerError::Disconnected)
    }
}

/// Receiver end - owned by the ingest worker
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<ViewEvent>,
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSender { sender }, EventReceiver { receiver })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub applied: u64,
    pub rejected: u64,
}

/// Applies queued events to the store until every sender is dropped or
/// the handle asks it to stop. Events already queued at shutdown are
/// applied before returning.
pub struct IngestWorker {
    store: WindowStore,
    receiver: EventReceiver,
    handle: WorkerHandle,
    stats: IngestStats,
}

impl IngestWorker {
    pub fn new(store: WindowStore, receiver: EventReceiver) -> (Self, WorkerHandle) {
        let handle = WorkerHandle::new();
        let worker = IngestWorker {
            store,
            receiver,
            handle: handle.clone(),
            stats: IngestStats::default(),
        };
        (worker, handle)
    }

    pub async fn run(mut self) -> IngestStats {
        loop {
            tokio::select! {
                maybe_event = self.receiver.receiver.recv() => match maybe_event {
                    Some(event) => self.apply(&event),
                    None => {
                        debug!("all event senders dropped");
                        break;
                    }
                },
                _ = self.handle.wait() => {
                    while let Ok(event) = self.receiver.receiver.try_recv() {
                        self.apply(&event);
                    }
                    break;
                }
            }
        }

        info!(
            applied = self.stats.applied,
            rejected = self.stats.rejected,
            "ingest worker stopped"
        );
        self.stats
    }

    fn apply(&mut self, event: &ViewEvent) {
        // The store logs and counts rejections itself
        match self.store.add_view(event) {
            Ok(()) => self.stats.applied += 1,
            Err(_) => self.stats.rejected += 1,
        }
    }
}
