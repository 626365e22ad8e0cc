//! Exception taxonomy: declared failures and the policy they carry.
//!
//! A layer hook reports a failure either as a [`LayerException`], whose
//! severity and action are fixed by its concrete variant, or as an
//! unanticipated [`anyhow::Error`]. The executor reads the metadata and
//! nothing else: severity picks the log level, action picks between
//! dropping the chunk and halting the layer.

use std::fmt;

use crate::layer::{Direction, LayerType, Side};

// ── Metadata ──────────────────────────────────────────────────────────────────

/// Log verbosity of a declared failure. No effect on control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// What the executor does after logging a declared failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionAction {
    /// Discard the failing chunk, keep the layer running.
    Drop,
    /// Halt both directions of the failing layer. Sibling layers are unaffected.
    Stop,
}

/// Origin tag attached to every failure log line, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogDomain {
    /// A declared [`LayerException`].
    Layer,
    /// An unanticipated error returned by a hook.
    Runtime,
    /// A failure that could not be classified (hook panics).
    Unknown,
}

impl fmt::Display for LogDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogDomain::Layer => "LAYER",
            LogDomain::Runtime => "RUNTIME",
            LogDomain::Unknown => "UNKNOWN",
        })
    }
}

// ── LayerException ────────────────────────────────────────────────────────────

/// A failure a layer hook anticipates and declares.
///
/// Implement it on an error enum and map each variant to fixed metadata in a
/// `match`. The values must not depend on anything computed at runtime.
pub trait LayerException: std::error::Error + Send + Sync + 'static {
    fn severity(&self) -> Severity;
    fn action(&self) -> ExceptionAction;
}

/// Error returned by [`crate::layer::LayerHandler`] hooks.
#[derive(Debug)]
pub enum HookError {
    /// Handled by policy: logged at its severity, then dropped or stopped.
    Declared(Box<dyn LayerException>),
    /// Always logged at ERROR under the RUNTIME domain and always stops the layer.
    Unexpected(anyhow::Error),
}

impl HookError {
    pub fn declared(err: impl LayerException) -> Self {
        HookError::Declared(Box::new(err))
    }

    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        HookError::Unexpected(err.into())
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Declared(e) => write!(f, "{e}"),
            HookError::Unexpected(e) => write!(f, "{e:#}"),
        }
    }
}

impl<E: LayerException> From<E> for HookError {
    fn from(err: E) -> Self {
        HookError::Declared(Box::new(err))
    }
}

impl From<anyhow::Error> for HookError {
    fn from(err: anyhow::Error) -> Self {
        HookError::Unexpected(err)
    }
}

// ── Engine errors ─────────────────────────────────────────────────────────────

/// Errors raised by the engine itself: wiring, validation and queueing.
///
/// These are returned to the caller. When one escapes a hook through `?`
/// it is handled like any other declared exception (see the metadata below).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("{layer} has no {side} layer wired")]
    NotWired { layer: LayerType, side: Side },

    #[error("{layer} already has a {side} layer wired")]
    AlreadyWired { layer: LayerType, side: Side },

    #[error("chunk has no header")]
    MissingHeader,

    #[error("chunk header must be the empty sentinel at a layer boundary, got {kind:?}")]
    MalformedHeader { kind: &'static str },

    #[error("{layer} {direction} queue is full (capacity {capacity})")]
    QueueFull {
        layer: LayerType,
        direction: Direction,
        capacity: usize,
    },

    #[error("payload overflow: {len} bytes into a {capacity}-byte buffer")]
    PayloadOverflow { len: usize, capacity: usize },
}

impl LayerException for LayerError {
    fn severity(&self) -> Severity {
        match self {
            LayerError::QueueFull { .. } | LayerError::PayloadOverflow { .. } => Severity::Warn,
            LayerError::NotWired { .. }
            | LayerError::AlreadyWired { .. }
            | LayerError::MissingHeader
            | LayerError::MalformedHeader { .. } => Severity::Error,
        }
    }

    fn action(&self) -> ExceptionAction {
        match self {
            LayerError::QueueFull { .. } | LayerError::PayloadOverflow { .. } => {
                ExceptionAction::Drop
            }
            LayerError::NotWired { .. }
            | LayerError::AlreadyWired { .. }
            | LayerError::MissingHeader
            | LayerError::MalformedHeader { .. } => ExceptionAction::Stop,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
