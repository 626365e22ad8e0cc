//! Bounded chunk queue, the only state a layer shares between workers.
//!
//! Producers never wait: [`ChunkQueue::offer`] fails as soon as the queue is
//! at capacity. The consumer side is held by at most one worker at a time,
//! which is what keeps processing within one direction strictly FIFO.

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::chunk::Chunk;

pub struct ChunkQueue {
    tx: mpsc::Sender<Chunk>,
    rx: Mutex<mpsc::Receiver<Chunk>>,
    capacity: usize,
}

/// Exclusive consumer access, held by a worker for as long as it runs.
pub type Consumer<'a> = MutexGuard<'a, mpsc::Receiver<Chunk>>;

impl ChunkQueue {
    /// `capacity` must be positive; [`crate::config::LayerConfig`] guarantees it.
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Non-blocking enqueue. Hands the chunk back if the queue is full.
    pub fn offer(&self, chunk: Chunk) -> Result<(), TrySendError<Chunk>> {
        self.tx.try_send(chunk)
    }

    /// Wait for exclusive consumer access. `recv().await` on the guard is the
    /// blocking take.
    pub async fn consumer(&self) -> Consumer<'_> {
        self.rx.lock().await
    }

    /// Non-blocking take. `None` if the queue is empty or a worker currently
    /// owns the consumer side.
    pub fn try_take(&self) -> Option<Chunk> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Chunks currently queued. Never exceeds [`ChunkQueue::capacity`].
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for ChunkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
