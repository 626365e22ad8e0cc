//! strata-core — the layer-chain engine.
//!
//! A stack is a linear chain of [`layer::Layer`]s. Each layer owns two
//! bounded queues and hands [`chunk::Chunk`]s to its neighbours; an
//! [`executor::LayerExecutor`] drives the queues and applies the exception
//! policy. Protocol logic lives in [`layer::LayerHandler`] implementations.

pub mod boundary;
pub mod chunk;
pub mod config;
pub mod exception;
pub mod executor;
pub mod layer;
pub mod logging;
pub mod queue;
pub mod stack;

pub use boundary::{
    BoundaryError, BoundaryHandler, ChunkConverter, FramePump, FrameSink, FrameSource, RawConverter,
};
pub use chunk::{Chunk, EmptyHeader, Header, OpaqueHeader, Payload};
pub use config::{ConfigError, LayerConfig, StackConfig};
pub use exception::{ExceptionAction, HookError, LayerError, LayerException, LogDomain, Severity};
pub use executor::{LayerExecutor, SingleWorkerExecutor};
pub use layer::{Direction, Layer, LayerHandler, LayerType, Passthrough, Side};
pub use stack::{Stack, StackBuilder, StackError};
