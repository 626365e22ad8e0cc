use std::sync::Arc;

use strata_core::{
    Chunk, EmptyHeader, HookError, Layer, LayerExecutor, LayerHandler, LayerType, OpaqueHeader,
    Passthrough, SingleWorkerExecutor, StackBuilder, StackConfig,
};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Chunk flow between layers
// ══════════════════════════════════════════════════════════════════════════════

/// Lower passthrough layer hands a chunk to the upper layer's inbound queue
/// unchanged, under the empty header.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_passthrough_delivers_to_upper_queue() {
    let lower = Layer::new(LayerType::Internet, config(8), Passthrough);
    let upper = Layer::new(LayerType::Transport, config(8), Passthrough);
    Layer::link(&lower, &upper).unwrap();

    lower.enqueue_inbound(chunk(&[0x01, 0x02])).unwrap();

    let executor = SingleWorkerExecutor::new();
    executor.start(lower.clone());
    wait_for(|| upper.inbound_queue().len() == 1).await;
    executor.stop();

    let delivered = upper.inbound_queue().try_take().unwrap();
    assert_eq!(delivered.payload().as_bytes(), &[0x01, 0x02]);
    assert!(EmptyHeader::is_sentinel(delivered.header().unwrap()));
    assert!(upper.inbound_queue().is_empty());
    assert!(lower.inbound_queue().is_empty());
}

/// Sets its own header before forwarding, as a real protocol layer would.
struct Tagger;

impl LayerHandler for Tagger {
    fn process_inbound(&self, layer: &Layer, mut chunk: Chunk) -> Result<(), HookError> {
        chunk.set_header(Arc::new(OpaqueHeader::new("ipv4", vec![0x45, 0x00, 0x00, 0x14])));
        Ok(layer.send_to_upper(chunk)?)
    }

    fn process_outbound(&self, layer: &Layer, mut chunk: Chunk) -> Result<(), HookError> {
        chunk.set_header(Arc::new(OpaqueHeader::new("ipv4", vec![0x45])));
        Ok(layer.send_to_lower(chunk)?)
    }
}

/// A layer's header never leaks across the boundary in either direction.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_headers_reset_at_every_boundary() {
    let (bottom, _, bottom_out) = recording_layer(LayerType::Ethernet, 8, false);
    let middle = Layer::new(LayerType::Internet, config(8), Tagger);
    let top = Layer::new(LayerType::Transport, config(8), Passthrough);
    Layer::link(&bottom, &middle).unwrap();
    Layer::link(&middle, &top).unwrap();

    middle.enqueue_inbound(chunk(&[0xaa])).unwrap();
    middle.enqueue_outbound(chunk(&[0xbb])).unwrap();

    let middle_exec = SingleWorkerExecutor::new();
    let bottom_exec = SingleWorkerExecutor::new();
    middle_exec.start(middle.clone());
    bottom_exec.start(bottom.clone());

    wait_for(|| top.inbound_queue().len() == 1).await;
    wait_for(|| snapshot(&bottom_out).len() == 1).await;
    assert!(middle_exec.is_running());
    assert!(bottom_exec.is_running());

    let up = top.inbound_queue().try_take().unwrap();
    assert!(up.has_empty_header());
    assert_eq!(snapshot(&bottom_out), vec![vec![0xbb]]);

    middle_exec.stop();
    bottom_exec.stop();
}

/// Chunks keep their order through every layer of a running stack.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stack_preserves_order_end_to_end() {
    let top = Recording::default();
    let top_in = top.inbound.clone();
    let bottom = Recording::default();
    let bottom_out = bottom.outbound.clone();

    let stack = StackBuilder::new(StackConfig::default())
        .layer(LayerType::Ethernet, bottom)
        .layer(LayerType::Internet, Recording::forwarding())
        .layer(LayerType::Transport, Recording::forwarding())
        .layer(LayerType::Application, top)
        .build()
        .unwrap();

    // The end layers record without forwarding, so traffic enters one layer in.
    let inbound_entry = stack.layer(LayerType::Internet).unwrap().clone();
    let outbound_entry = stack.layer(LayerType::Transport).unwrap().clone();
    stack.start();

    let sent: Vec<Vec<u8>> = (0u8..32).map(|i| vec![i, i.wrapping_mul(3)]).collect();
    for payload in &sent {
        inbound_entry.enqueue_inbound(chunk(payload)).unwrap();
        outbound_entry.enqueue_outbound(chunk(payload)).unwrap();
    }

    wait_for(|| snapshot(&top_in).len() == sent.len()).await;
    wait_for(|| snapshot(&bottom_out).len() == sent.len()).await;
    assert_eq!(snapshot(&top_in), sent);
    assert_eq!(snapshot(&bottom_out), sent);

    for layer in stack.layers() {
        assert!(stack.is_running(layer.kind()), "{} stopped", layer.kind());
    }
    stack.stop();
}
