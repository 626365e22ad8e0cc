//! strata integration test harness.
//!
//! Tests here assemble real layer chains and drive them with real executors
//! on a multi-threaded runtime:
//!
//!   cargo test --test integration
//!
//! Nothing is shared between tests; every test builds its own layers.

mod chain;
mod failures;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use strata_core::{
    Chunk, ExceptionAction, HookError, Layer, LayerConfig, LayerException, LayerHandler,
    LayerType, Payload, Severity,
};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Payload byte that makes a [`Recording`] handler fail with a DROP exception.
pub const DROP_BYTE: u8 = 0xd0;
/// Payload byte that makes a [`Recording`] handler fail with a STOP exception.
pub const STOP_BYTE: u8 = 0x5f;

/// Poll `cond` every 10ms for up to 2s.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Give workers a chance to run when asserting that nothing happens.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn chunk(bytes: &[u8]) -> Chunk {
    Chunk::from_payload(Payload::from(bytes))
}

pub fn config(capacity: usize) -> LayerConfig {
    LayerConfig::new(capacity, capacity).expect("positive capacity")
}

#[derive(Debug, thiserror::Error)]
pub enum Rejected {
    #[error("rejected chunk {0:#04x}")]
    Skip(u8),
    #[error("refusing to continue after {0:#04x}")]
    Fatal(u8),
}

impl LayerException for Rejected {
    fn severity(&self) -> Severity {
        match self {
            Rejected::Skip(_) => Severity::Warn,
            Rejected::Fatal(_) => Severity::Error,
        }
    }

    fn action(&self) -> ExceptionAction {
        match self {
            Rejected::Skip(_) => ExceptionAction::Drop,
            Rejected::Fatal(_) => ExceptionAction::Stop,
        }
    }
}

pub type Log = Arc<Mutex<Vec<Vec<u8>>>>;

/// Records every payload it sees and, unless it is the top of the chain,
/// forwards it on. Chunks starting with [`DROP_BYTE`] or [`STOP_BYTE`] fail.
#[derive(Default)]
pub struct Recording {
    pub inbound: Log,
    pub outbound: Log,
    pub forward: bool,
}

impl Recording {
    pub fn forwarding() -> Self {
        Self {
            forward: true,
            ..Self::default()
        }
    }

    fn verdict(chunk: &Chunk) -> Result<(), HookError> {
        match chunk.payload().as_bytes().first() {
            Some(&DROP_BYTE) => Err(Rejected::Skip(DROP_BYTE).into()),
            Some(&STOP_BYTE) => Err(Rejected::Fatal(STOP_BYTE).into()),
            _ => Ok(()),
        }
    }
}

impl LayerHandler for Recording {
    fn process_inbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        Self::verdict(&chunk)?;
        self.inbound.lock().unwrap().push(chunk.payload().as_bytes().to_vec());
        if self.forward {
            layer.send_to_upper(chunk)?;
        }
        Ok(())
    }

    fn process_outbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        Self::verdict(&chunk)?;
        self.outbound.lock().unwrap().push(chunk.payload().as_bytes().to_vec());
        if self.forward {
            layer.send_to_lower(chunk)?;
        }
        Ok(())
    }
}

/// A layer driven by a [`Recording`] handler, plus its logs.
pub fn recording_layer(kind: LayerType, capacity: usize, forward: bool) -> (Arc<Layer>, Log, Log) {
    let handler = Recording {
        forward,
        ..Recording::default()
    };
    let (inbound, outbound) = (handler.inbound.clone(), handler.outbound.clone());
    (Layer::new(kind, config(capacity), handler), inbound, outbound)
}

pub fn snapshot(log: &Log) -> Vec<Vec<u8>> {
    log.lock().unwrap().clone()
}
