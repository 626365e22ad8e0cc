//! Application layer that reflects every inbound chunk back down the stack.

use strata_core::{Chunk, HookError, Layer, LayerHandler};

pub struct Echo;

impl LayerHandler for Echo {
    fn process_inbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        tracing::debug!(len = chunk.payload().len(), "echoing chunk");
        Ok(layer.send_to_lower(chunk)?)
    }

    fn process_outbound(&self, layer: &Layer, chunk: Chunk) -> Result<(), HookError> {
        Ok(layer.send_to_lower(chunk)?)
    }
}
