//! Boundary: where raw frames enter and leave a stack.
//!
//! The engine never talks to a capture device directly. The bottom layer of
//! a stack uses a [`BoundaryHandler`] to push outbound chunks into a
//! [`FrameSink`], and a [`FramePump`] feeds frames from a [`FrameSource`]
//! into that layer's inbound queue. How bytes map onto a chunk is decided by
//! a [`ChunkConverter`]; protocol-specific converters live outside this crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::task::{JoinError, JoinHandle};

use crate::chunk::{Chunk, Payload};
use crate::exception::{ExceptionAction, HookError, LayerError, LayerException, Severity};
use crate::layer::{Layer, LayerHandler};

// ── Contracts ─────────────────────────────────────────────────────────────────

/// A blocking supplier of raw frames.
pub trait FrameSource: Send {
    /// Block until the next frame arrives. `Ok(None)` means end of stream.
    fn next_frame(&mut self) -> Result<Option<Bytes>, BoundaryError>;
}

/// Accepts one raw frame at a time for transmission.
pub trait FrameSink: Send + Sync {
    fn transmit(&self, frame: &[u8]) -> Result<(), BoundaryError>;
}

/// Converts between raw frames and chunks.
pub trait ChunkConverter: Send + Sync {
    fn to_chunk(&self, frame: &[u8]) -> Result<Chunk, BoundaryError>;
    fn to_frame(&self, chunk: &Chunk) -> Bytes;
}

/// Protocol-agnostic converter.
///
/// A frame becomes a payload under the empty header; a chunk becomes its
/// header bytes followed by its payload bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawConverter;

impl ChunkConverter for RawConverter {
    fn to_chunk(&self, frame: &[u8]) -> Result<Chunk, BoundaryError> {
        Ok(Chunk::from_payload(Payload::from(frame)))
    }

    fn to_frame(&self, chunk: &Chunk) -> Bytes {
        let header = chunk.header().map(|h| h.as_bytes()).unwrap_or_default();
        let payload = chunk.payload().as_bytes();
        let mut frame = BytesMut::with_capacity(header.len() + payload.len());
        frame.extend_from_slice(header);
        frame.extend_from_slice(payload);
        frame.freeze()
    }
}

// ── BoundaryHandler ───────────────────────────────────────────────────────────

/// Handler for the bottom layer of a stack.
///
/// Inbound chunks go up unchanged. Outbound chunks are converted to frames
/// and handed to the sink.
pub struct BoundaryHandler<C, S> {
    converter: C,
    sink: S,
}

impl<C: ChunkConverter, S: FrameSink> BoundaryHandler<C, S> {
    pub fn new(converter: C, sink: S) -> Self {
        Self { converter, sink }
    }
}

impl<C, S> LayerHandler for BoundaryHandler<C, S>
where
    C: ChunkConverter + 'static,
    S: FrameSink + 'static,
{
    fn process_inbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        Ok(layer.send_to_upper(chunk)?)
    }

    fn process_outbound(&self, _layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        let frame = self.converter.to_frame(&chunk);
        Ok(self.sink.transmit(&frame)?)
    }
}

// ── FramePump ─────────────────────────────────────────────────────────────────

/// Moves frames from a source into a layer's inbound queue on a blocking
/// thread.
///
/// Frames that cannot be converted or do not fit in the queue are logged and
/// dropped. The pump ends at end of stream, on a source error, or when
/// stopped; a stop request is noticed between frames.
pub struct FramePump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl FramePump {
    pub fn spawn<S, C>(source: S, converter: C, layer: Arc<Layer>) -> Self
    where
        S: FrameSource + 'static,
        C: ChunkConverter + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle =
            tokio::task::spawn_blocking(move || pump(source, converter, &layer, &flag));
        Self { stop, handle }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pump to end. Returns the number of frames delivered.
    ///
    /// Cancel-safe, so it can sit in a `select!`; do not await it again once
    /// it has returned.
    pub async fn join(&mut self) -> Result<u64, JoinError> {
        (&mut self.handle).await
    }
}

/// Leading bytes of a rejected frame included in the log line.
const PREVIEW_LEN: usize = 32;

fn pump<S: FrameSource, C: ChunkConverter>(
    mut source: S,
    converter: C,
    layer: &Layer,
    stop: &AtomicBool,
) -> u64 {
    let kind = layer.kind();
    let mut delivered = 0u64;

    while !stop.load(Ordering::Acquire) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(layer = %kind, delivered, "frame source exhausted");
                break;
            }
            Err(e) => {
                tracing::error!(layer = %kind, error = %e, "frame source failed");
                break;
            }
        };

        let chunk = match converter.to_chunk(&frame) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(
                    layer = %kind,
                    error = %e,
                    frame = %hex::encode(&frame[..frame.len().min(PREVIEW_LEN)]),
                    "frame dropped"
                );
                continue;
            }
        };

        match layer.enqueue_inbound(chunk) {
            Ok(()) => delivered += 1,
            Err(e @ LayerError::QueueFull { .. }) => {
                tracing::warn!(layer = %kind, error = %e, "frame dropped");
            }
            Err(e) => {
                tracing::error!(layer = %kind, error = %e, "converter produced an invalid chunk");
            }
        }
    }
    delivered
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    #[error("frame source closed")]
    Closed,

    #[error("frame I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot convert frame: {0}")]
    Conversion(String),

    #[error("transmit failed")]
    Transmit(#[source] std::io::Error),
}

impl LayerException for BoundaryError {
    fn severity(&self) -> Severity {
        match self {
            BoundaryError::Closed => Severity::Info,
            BoundaryError::Io(_) => Severity::Error,
            BoundaryError::Conversion(_) | BoundaryError::Transmit(_) => Severity::Warn,
        }
    }

    fn action(&self) -> ExceptionAction {
        match self {
            BoundaryError::Closed | BoundaryError::Io(_) => ExceptionAction::Stop,
            BoundaryError::Conversion(_) | BoundaryError::Transmit(_) => ExceptionAction::Drop,
        }
    }
}
