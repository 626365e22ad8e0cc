//! Hex line framing for the terminal: one frame per line, in and out.

use std::io::{BufRead, Write};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use strata_core::{BoundaryError, Chunk, ChunkConverter, FrameSink, FrameSource, RawConverter};

/// Reads one frame per non-blank line. Bytes are passed through untouched,
/// even when they are not text; decoding is the converter's job.
pub struct LineSource<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> FrameSource for LineSource<R> {
    fn next_frame(&mut self) -> Result<Option<Bytes>, BoundaryError> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim_ascii();
            if !trimmed.is_empty() {
                return Ok(Some(Bytes::copy_from_slice(trimmed)));
            }
        }
    }
}

/// Inbound frames are hex text; outbound frames are raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexConverter;

impl ChunkConverter for HexConverter {
    fn to_chunk(&self, frame: &[u8]) -> Result<Chunk, BoundaryError> {
        let raw = hex::decode(frame).map_err(|e| BoundaryError::Conversion(e.to_string()))?;
        RawConverter.to_chunk(&raw)
    }

    fn to_frame(&self, chunk: &Chunk) -> Bytes {
        RawConverter.to_frame(chunk)
    }
}

/// Writes every transmitted frame as a line of hex.
pub struct HexLineSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> HexLineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> FrameSink for HexLineSink<W> {
    fn transmit(&self, frame: &[u8]) -> Result<(), BoundaryError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", hex::encode(frame))
            .and_then(|_| out.flush())
            .map_err(BoundaryError::Transmit)
    }
}
