//! Chunk: the unit of work carried through a stack.
//!
//! Every chunk pairs exactly one header with exactly one payload. Headers
//! are protocol-specific and immutable; the payload is a fixed-size mutable
//! buffer. Ownership of a chunk moves wholesale through the layer queues, so
//! a chunk is never touched by two workers at once.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};

use crate::exception::LayerError;

// ── Header ────────────────────────────────────────────────────────────────────

/// Protocol-specific header bytes attached to a chunk.
///
/// Implementations are immutable once built. A layer that needs typed access
/// to its own header uses [`Chunk::header_as`].
pub trait Header: fmt::Debug + Send + Sync + 'static {
    /// Raw header bytes as they would appear on the wire.
    fn as_bytes(&self) -> &[u8];

    /// Short label for diagnostics, e.g. "ethernet" or "empty".
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

/// The "no protocol header applied" sentinel.
///
/// There is exactly one instance per process, reachable through
/// [`EmptyHeader::shared`]. Identity, not content, is what makes a header
/// empty: a chunk crossing a layer boundary must carry this very instance.
#[derive(Debug)]
pub struct EmptyHeader {
    _private: (),
}

impl EmptyHeader {
    /// The shared sentinel.
    pub fn shared() -> Arc<dyn Header> {
        static INSTANCE: OnceLock<Arc<EmptyHeader>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| Arc::new(EmptyHeader { _private: () }))
            .clone()
    }

    /// True if `header` is the shared sentinel instance.
    pub fn is_sentinel(header: &Arc<dyn Header>) -> bool {
        let sentinel = Self::shared();
        std::ptr::eq(
            Arc::as_ptr(header) as *const (),
            Arc::as_ptr(&sentinel) as *const (),
        )
    }
}

impl Header for EmptyHeader {
    fn as_bytes(&self) -> &[u8] {
        &[]
    }

    fn kind(&self) -> &'static str {
        "empty"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An unstructured header: a label plus immutable bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueHeader {
    kind: &'static str,
    bytes: Bytes,
}

impl OpaqueHeader {
    pub fn new(kind: &'static str, bytes: impl Into<Bytes>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }
}

impl Header for OpaqueHeader {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// Mutable payload bytes with a fixed length.
///
/// The buffer never grows. [`Payload::set_bytes`] overwrites in place and
/// rejects sources longer than the current buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: BytesMut,
}

impl Payload {
    pub fn new(bytes: impl Into<BytesMut>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// A zero-filled payload of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: BytesMut::zeroed(len),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy `src` over the start of the buffer.
    ///
    /// Bytes past `src.len()` keep their previous value. Fails without
    /// touching the buffer if `src` is longer than the payload.
    pub fn set_bytes(&mut self, src: &[u8]) -> Result<(), LayerError> {
        if src.len() > self.bytes.len() {
            return Err(LayerError::PayloadOverflow {
                len: src.len(),
                capacity: self.bytes.len(),
            });
        }
        self.bytes[..src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn into_bytes(self) -> BytesMut {
        self.bytes
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::new(BytesMut::from(bytes))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(BytesMut::from(&bytes[..]))
    }
}

// ── Chunk ─────────────────────────────────────────────────────────────────────

/// A header + payload pair moving through the stack.
///
/// The header slot is optional only so a layer can take its header out while
/// parsing; a chunk without a header is rejected at every queue.
pub struct Chunk {
    header: Option<Arc<dyn Header>>,
    payload: Payload,
}

impl Chunk {
    pub fn new(header: Arc<dyn Header>, payload: Payload) -> Self {
        Self {
            header: Some(header),
            payload,
        }
    }

    /// A chunk carrying the empty sentinel header, ready to enter a queue.
    pub fn from_payload(payload: Payload) -> Self {
        Self::new(EmptyHeader::shared(), payload)
    }

    pub fn header(&self) -> Option<&Arc<dyn Header>> {
        self.header.as_ref()
    }

    /// Typed view of the current header, if it is an `H`.
    pub fn header_as<H: Header>(&self) -> Option<&H> {
        self.header.as_ref()?.as_any().downcast_ref::<H>()
    }

    pub fn set_header(&mut self, header: Arc<dyn Header>) {
        self.header = Some(header);
    }

    /// Remove the header, leaving the chunk without one.
    pub fn take_header(&mut self) -> Option<Arc<dyn Header>> {
        self.header.take()
    }

    /// Install the empty sentinel.
    pub fn reset_header(&mut self) {
        self.header = Some(EmptyHeader::shared());
    }

    pub fn has_empty_header(&self) -> bool {
        self.header.as_ref().is_some_and(EmptyHeader::is_sentinel)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("header", &self.header.as_ref().map(|h| h.kind()))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
