//! Layer: one stage of a protocol stack.
//!
//! A layer owns its two bounded queues, the links to its neighbours and the
//! validation applied at every hand-off. It never spawns anything: an
//! [`crate::executor::LayerExecutor`] pulls from the queues and calls back
//! into the layer's [`LayerHandler`].
//!
//! Inbound chunks flow upward (link → application), outbound chunks flow
//! downward. Whenever a chunk crosses a boundary its header is reset to the
//! [`EmptyHeader`] sentinel so one layer's header never leaks into the next.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;

use crate::chunk::{Chunk, EmptyHeader};
use crate::config::LayerConfig;
use crate::exception::{HookError, LayerError};
use crate::queue::ChunkQueue;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Display and correlation tag for a layer. Carries no behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Ethernet,
    Internet,
    Transport,
    Application,
}

impl LayerType {
    /// Every layer type, bottom of the stack first.
    pub const ALL: [LayerType; 4] = [
        LayerType::Ethernet,
        LayerType::Internet,
        LayerType::Transport,
        LayerType::Application,
    ];

    /// Lower-case key used in config files.
    pub fn key(&self) -> &'static str {
        match self {
            LayerType::Ethernet => "ethernet",
            LayerType::Internet => "internet",
            LayerType::Transport => "transport",
            LayerType::Application => "application",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayerType::Ethernet => "Ethernet",
            LayerType::Internet => "Internet",
            LayerType::Transport => "Transport",
            LayerType::Application => "Application",
        })
    }
}

/// Flow direction. Inbound travels up the stack, outbound travels down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        })
    }
}

/// Which neighbour of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Upper,
    Lower,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Upper => "upper",
            Side::Lower => "lower",
        })
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// Protocol logic of a layer.
///
/// Hooks receive the owning [`Layer`] so they can forward with
/// [`Layer::send_to_upper`] / [`Layer::send_to_lower`]. A hook that simply
/// returns `Ok(())` without forwarding consumes the chunk.
///
/// Return a [`crate::exception::LayerException`] for anticipated failures;
/// anything else (an `anyhow::Error`, or a panic) halts the layer.
pub trait LayerHandler: Send + Sync + 'static {
    /// Interpret this layer's header on a chunk arriving from below.
    fn process_inbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError>;

    /// Build this layer's header on a chunk arriving from above.
    fn process_outbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError>;
}

/// Forwards chunks unchanged in both directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl LayerHandler for Passthrough {
    fn process_inbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        Ok(layer.send_to_upper(chunk)?)
    }

    fn process_outbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        Ok(layer.send_to_lower(chunk)?)
    }
}

// ── Layer ─────────────────────────────────────────────────────────────────────

pub struct Layer {
    kind: LayerType,
    config: LayerConfig,
    inbound: ChunkQueue,
    outbound: ChunkQueue,
    upper: OnceLock<Weak<Layer>>,
    lower: OnceLock<Weak<Layer>>,
    handler: Box<dyn LayerHandler>,
}

impl Layer {
    pub fn new(kind: LayerType, config: LayerConfig, handler: impl LayerHandler) -> Arc<Self> {
        Self::with_handler(kind, config, Box::new(handler))
    }

    pub fn with_handler(
        kind: LayerType,
        config: LayerConfig,
        handler: Box<dyn LayerHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            config,
            inbound: ChunkQueue::new(config.inbound_queue_capacity()),
            outbound: ChunkQueue::new(config.outbound_queue_capacity()),
            upper: OnceLock::new(),
            lower: OnceLock::new(),
            handler,
        })
    }

    // ── Wiring ───────────────────────────────────────────────────────────────

    /// Set the layer above this one. Each side can be wired once, before
    /// any executor starts.
    pub fn set_upper_layer(&self, upper: &Arc<Layer>) -> Result<(), LayerError> {
        self.upper
            .set(Arc::downgrade(upper))
            .map_err(|_| LayerError::AlreadyWired {
                layer: self.kind,
                side: Side::Upper,
            })
    }

    /// Set the layer below this one.
    pub fn set_lower_layer(&self, lower: &Arc<Layer>) -> Result<(), LayerError> {
        self.lower
            .set(Arc::downgrade(lower))
            .map_err(|_| LayerError::AlreadyWired {
                layer: self.kind,
                side: Side::Lower,
            })
    }

    /// Wire both sides of the boundary between `lower` and `upper`.
    pub fn link(lower: &Arc<Layer>, upper: &Arc<Layer>) -> Result<(), LayerError> {
        lower.set_upper_layer(upper)?;
        upper.set_lower_layer(lower)
    }

    pub fn upper(&self) -> Option<Arc<Layer>> {
        self.upper.get().and_then(Weak::upgrade)
    }

    pub fn lower(&self) -> Option<Arc<Layer>> {
        self.lower.get().and_then(Weak::upgrade)
    }

    // ── Transport ────────────────────────────────────────────────────────────

    /// Hand `chunk` to the upper layer's inbound queue, header reset.
    pub fn send_to_upper(&self, mut chunk: Chunk) -> Result<(), LayerError> {
        let upper = self.upper().ok_or(LayerError::NotWired {
            layer: self.kind,
            side: Side::Upper,
        })?;
        chunk.reset_header();
        upper.enqueue_inbound(chunk)
    }

    /// Hand `chunk` to the lower layer's outbound queue, header reset.
    pub fn send_to_lower(&self, mut chunk: Chunk) -> Result<(), LayerError> {
        let lower = self.lower().ok_or(LayerError::NotWired {
            layer: self.kind,
            side: Side::Lower,
        })?;
        chunk.reset_header();
        lower.enqueue_outbound(chunk)
    }

    /// Validated, non-blocking enqueue into this layer's inbound queue.
    ///
    /// Also the entry point for whatever feeds the bottom of a stack.
    pub fn enqueue_inbound(&self, chunk: Chunk) -> Result<(), LayerError> {
        self.enqueue(Direction::Inbound, chunk)
    }

    /// Validated, non-blocking enqueue into this layer's outbound queue.
    pub fn enqueue_outbound(&self, chunk: Chunk) -> Result<(), LayerError> {
        self.enqueue(Direction::Outbound, chunk)
    }

    fn enqueue(&self, direction: Direction, chunk: Chunk) -> Result<(), LayerError> {
        validate(&chunk)?;
        let queue = self.queue(direction);
        match queue.offer(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LayerError::QueueFull {
                layer: self.kind,
                direction,
                capacity: queue.capacity(),
            }),
            // The layer holds the receiver for its whole life.
            Err(TrySendError::Closed(_)) => unreachable!("layer queue receiver dropped"),
        }
    }

    // ── Hooks ────────────────────────────────────────────────────────────────

    /// Run the handler hook matching `direction`.
    pub fn dispatch(&self, direction: Direction, chunk: Chunk) -> Result<(), HookError> {
        match direction {
            Direction::Inbound => self.handler.process_inbound(self, chunk),
            Direction::Outbound => self.handler.process_outbound(self, chunk),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn kind(&self) -> LayerType {
        self.kind
    }

    pub fn config(&self) -> LayerConfig {
        self.config
    }

    pub fn inbound_queue(&self) -> &ChunkQueue {
        &self.inbound
    }

    pub fn outbound_queue(&self) -> &ChunkQueue {
        &self.outbound
    }

    pub fn queue(&self, direction: Direction) -> &ChunkQueue {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("kind", &self.kind)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}

/// Reject chunks that are not fit to cross a layer boundary.
fn validate(chunk: &Chunk) -> Result<(), LayerError> {
    let header = chunk.header().ok_or(LayerError::MissingHeader)?;
    if !EmptyHeader::is_sentinel(header) {
        return Err(LayerError::MalformedHeader {
            kind: header.kind(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
