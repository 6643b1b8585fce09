use flume::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use super::long_term::LongTermStore;
use crate::models::MemoryItem;
use crate::utils::error::MemoryError;

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Max pending jobs before `enqueue` reports `QueueFull`
    pub capacity: usize,

    /// Number of worker tasks draining the queue
    pub worker_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            worker_count: 2,
        }
    }
}

/// Pending and running job count, with a wake-up for `wait_idle`.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Background embedding of long-term items.
/// `enqueue` returns as soon as the job is queued; the item becomes
/// searchable only after a worker has embedded and upserted it.
#[derive(Clone)]
pub struct EmbeddingQueue {
    sender: Sender<MemoryItem>,
    in_flight: Arc<InFlight>,
}

impl EmbeddingQueue {
    /// Initialize queue with background workers
    pub fn new(store: Arc<LongTermStore>, config: QueueConfig) -> Self {
        let (sender, receiver) = bounded(config.capacity);
        let in_flight = Arc::new(InFlight::default());

        info!(
            "Initializing EmbeddingQueue: capacity={}, workers={}",
            config.capacity, config.worker_count
        );

        for worker_id in 0..config.worker_count {
            let store = store.clone();
            let receiver = receiver.clone();
            let in_flight = in_flight.clone();

            tokio::spawn(async move {
                Self::worker_loop(worker_id, store, receiver, in_flight).await;
            });
        }

        Self { sender, in_flight }
    }

    /// Queue an item for embedding (non-blocking).
    pub fn enqueue(&self, item: MemoryItem) -> Result<(), MemoryError> {
        self.in_flight.begin();
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => {
                self.in_flight.end();
                error!("Embedding queue full, rejecting {}", item.id());
                Err(MemoryError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.in_flight.end();
                Err(MemoryError::BackendUnavailable(
                    "embedding workers have stopped".to_string(),
                ))
            }
        }
    }

    /// Jobs queued or being processed.
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolve once every queued job has been processed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn worker_loop(
        worker_id: usize,
        store: Arc<LongTermStore>,
        receiver: Receiver<MemoryItem>,
        in_flight: Arc<InFlight>,
    ) {
        debug!("Embedding worker {} started", worker_id);

        while let Ok(item) = receiver.recv_async().await {
            match store.put_item(&item).await {
                Ok(id) => debug!("Worker {} embedded {}", worker_id, id),
                Err(e) => error!("Worker {} failed to store {}: {}", worker_id, item.id(), e),
            }
            in_flight.end();
        }

        debug!("Embedding worker {} stopped", worker_id);
    }
}
