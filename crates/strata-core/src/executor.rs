//! Layer executors: the concurrency strategy that drives a layer.
//!
//! [`LayerExecutor`] says nothing about threads or scheduling. The reference
//! [`SingleWorkerExecutor`] runs exactly one task per direction, which gives
//! strict FIFO processing within a direction while both directions, and all
//! other layers, proceed independently.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::chunk::Chunk;
use crate::exception::{ExceptionAction, HookError};
use crate::layer::{Direction, Layer, LayerType};
use crate::logging;

/// Starts and stops the processing of one layer.
pub trait LayerExecutor: Send + Sync {
    /// Begin driving both queues of `layer`. No-op if already running.
    fn start(&self, layer: Arc<Layer>);

    /// Halt processing. Safe to call any number of times, from any task,
    /// including from inside a hook. Does not wait for workers to exit.
    fn stop(&self);

    fn is_running(&self) -> bool;
}

// ── State ─────────────────────────────────────────────────────────────────────

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;

/// Handles for one start/stop cycle.
struct Workers {
    layer: LayerType,
    generation: u64,
    shutdown: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    state: AtomicU8,
    /// Bumped by every start. A worker only acts for the cycle it was spawned in.
    generation: AtomicU64,
    /// Held across every state transition so start/stop cannot interleave.
    workers: Mutex<Option<Workers>>,
    active: AtomicUsize,
}

impl Inner {
    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Running, and still in the cycle that `generation` was started as.
    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::Acquire) == generation
    }

    fn lock_workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        let mut slot = self.lock_workers();
        self.stop_locked(&mut slot);
    }

    /// Halt requested by a worker. Does nothing once a later start has
    /// replaced the worker's cycle.
    fn stop_if_current(&self, generation: u64) {
        let mut slot = self.lock_workers();
        if self.generation.load(Ordering::Acquire) == generation {
            self.stop_locked(&mut slot);
        } else {
            tracing::debug!(generation, "stale worker halt ignored");
        }
    }

    fn stop_locked(&self, slot: &mut Option<Workers>) {
        self.state.store(STOPPED, Ordering::Release);
        if let Some(workers) = slot.take() {
            tracing::info!(
                layer = %workers.layer,
                generation = workers.generation,
                "layer executor stopped"
            );
            // Receivers may already be gone if both workers exited.
            let _ = workers.shutdown.send(());
            // Dropping the handles detaches the tasks; they exit on their own.
            drop(workers.handles);
        }
    }
}

// ── SingleWorkerExecutor ──────────────────────────────────────────────────────

/// One dedicated worker task per direction of a single layer.
///
/// Failure policy inside a worker, in order:
///   1. shutdown signalled → exit
///   2. declared exception → log at its severity; STOP halts the layer, DROP continues
///   3. unanticipated error → log ERROR/RUNTIME, halt the layer
///   4. hook panic → log ERROR/UNKNOWN, halt the layer
///
/// Halting always stops both directions of this layer and nothing else, and
/// only for the start cycle the failing worker belongs to: a hook still
/// running from before a stop/start cannot halt the restarted layer.
/// Chunks still queued at stop time are left where they are. A chunk a
/// worker dequeued just as the stop landed is discarded.
pub struct SingleWorkerExecutor {
    runtime: Handle,
    inner: Arc<Inner>,
}

impl SingleWorkerExecutor {
    /// Executor spawning onto the current tokio runtime.
    ///
    /// Panics if called outside a runtime; use [`Self::with_handle`] there.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            inner: Arc::new(Inner {
                state: AtomicU8::new(STOPPED),
                generation: AtomicU64::new(0),
                workers: Mutex::new(None),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Worker tasks that have started and not yet exited.
    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }
}

impl LayerExecutor for SingleWorkerExecutor {
    fn start(&self, layer: Arc<Layer>) {
        let mut slot = self.inner.lock_workers();
        if self.inner.is_running() {
            return;
        }

        // Workers check both after every dequeue, so they change first.
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.state.store(RUNNING, Ordering::Release);
        let (shutdown, _) = broadcast::channel(1);
        let handles = [Direction::Inbound, Direction::Outbound]
            .into_iter()
            .map(|direction| {
                let span = tracing::info_span!(
                    "layer_worker",
                    layer = %layer.kind(),
                    %direction
                );
                let worker = Worker {
                    layer: layer.clone(),
                    direction,
                    generation,
                    inner: self.inner.clone(),
                    shutdown: shutdown.subscribe(),
                };
                self.inner.active.fetch_add(1, Ordering::AcqRel);
                self.runtime.spawn(worker.run().instrument(span))
            })
            .collect();

        *slot = Some(Workers {
            layer: layer.kind(),
            generation,
            shutdown,
            handles,
        });
        tracing::info!(layer = %layer.kind(), generation, "layer executor started");
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

impl Drop for SingleWorkerExecutor {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker {
    layer: Arc<Layer>,
    direction: Direction,
    generation: u64,
    inner: Arc<Inner>,
    shutdown: broadcast::Receiver<()>,
}

/// Why a worker loop ended.
#[derive(Debug)]
enum Exit {
    Shutdown,
    Halted,
}

impl Worker {
    async fn run(mut self) {
        let exit = self.drive().await;
        self.inner.active.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(?exit, "layer worker exited");
    }

    async fn drive(&mut self) -> Exit {
        let layer = self.layer.clone();
        let queue = layer.queue(self.direction);

        // A worker from a previous start may still be holding the consumer.
        let mut consumer = tokio::select! {
            biased;
            _ = self.shutdown.recv() => return Exit::Shutdown,
            consumer = queue.consumer() => consumer,
        };

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.shutdown.recv() => return Exit::Shutdown,
                next = consumer.recv() => match next {
                    Some(chunk) => chunk,
                    None => return Exit::Shutdown,
                },
            };
            // The chunk is already off the queue and cannot go back.
            if !self.inner.is_current(self.generation) {
                tracing::debug!(
                    len = chunk.payload().len(),
                    "executor stopped, dequeued chunk discarded"
                );
                return Exit::Shutdown;
            }
            if let Err(exit) = self.process(chunk) {
                return exit;
            }
        }
    }

    /// Run one hook and apply the failure policy.
    fn process(&self, chunk: Chunk) -> Result<(), Exit> {
        let kind = self.layer.kind();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.layer.dispatch(self.direction, chunk)
        }));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(HookError::Declared(err))) => {
                logging::log_exception(err.as_ref(), kind);
                match err.action() {
                    ExceptionAction::Drop => Ok(()),
                    ExceptionAction::Stop => {
                        self.inner.stop_if_current(self.generation);
                        Err(Exit::Halted)
                    }
                }
            }
            Ok(Err(HookError::Unexpected(err))) => {
                logging::log_unexpected(&err, kind);
                self.inner.stop_if_current(self.generation);
                Err(Exit::Halted)
            }
            Err(payload) => {
                logging::log_panic(&panic_message(payload.as_ref()), kind);
                self.inner.stop_if_current(self.generation);
                Err(Exit::Halted)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
