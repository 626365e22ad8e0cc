use std::sync::Arc;

use strata_core::{
    Chunk, Layer, LayerError, LayerExecutor, LayerType, OpaqueHeader, Passthrough, Payload,
    SingleWorkerExecutor,
};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Exception policy
// ══════════════════════════════════════════════════════════════════════════════

/// A DROP exception discards one chunk; the next one is still processed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_exception_skips_only_the_failing_chunk() {
    let (layer, inbound, _) = recording_layer(LayerType::Transport, 8, false);
    layer.enqueue_inbound(chunk(&[DROP_BYTE, 0x00])).unwrap();
    layer.enqueue_inbound(chunk(&[0x01])).unwrap();

    let executor = SingleWorkerExecutor::new();
    executor.start(layer.clone());
    wait_for(|| snapshot(&inbound) == vec![vec![0x01]]).await;
    assert!(executor.is_running());
    executor.stop();
}

/// A STOP exception halts its own layer before the next chunk; an unrelated
/// layer keeps going.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_exception_is_isolated_to_its_layer() {
    let (l, l_inbound, _) = recording_layer(LayerType::Internet, 8, false);
    let (m, m_inbound, _) = recording_layer(LayerType::Transport, 8, false);

    l.enqueue_inbound(chunk(&[STOP_BYTE])).unwrap();
    l.enqueue_inbound(chunk(&[0x02])).unwrap();

    let l_exec = SingleWorkerExecutor::new();
    let m_exec = SingleWorkerExecutor::new();
    l_exec.start(l.clone());
    m_exec.start(m.clone());

    wait_for(|| !l_exec.is_running()).await;
    m.enqueue_inbound(chunk(&[0x03])).unwrap();
    wait_for(|| snapshot(&m_inbound) == vec![vec![0x03]]).await;

    assert!(m_exec.is_running());
    assert!(snapshot(&l_inbound).is_empty());
    assert_eq!(l.inbound_queue().len(), 1, "follow-up chunk stays queued");
    m_exec.stop();
}

/// A halted layer stops both directions, not just the one that failed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_exception_halts_both_directions() {
    let (layer, _, outbound) = recording_layer(LayerType::Application, 8, false);
    layer.enqueue_inbound(chunk(&[STOP_BYTE])).unwrap();

    let executor = SingleWorkerExecutor::new();
    executor.start(layer.clone());
    wait_for(|| executor.active_workers() == 0).await;

    layer.enqueue_outbound(chunk(&[0x04])).unwrap();
    settle().await;
    assert!(snapshot(&outbound).is_empty());
    assert_eq!(layer.outbound_queue().len(), 1);
}

/// Forwarding into a layer with no upper neighbour is a wiring fault and
/// stops the layer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unwired_neighbour_stops_layer() {
    let (layer, inbound, _) = recording_layer(LayerType::Transport, 8, true);
    layer.enqueue_inbound(chunk(&[0x05])).unwrap();
    layer.enqueue_inbound(chunk(&[0x06])).unwrap();

    let executor = SingleWorkerExecutor::new();
    executor.start(layer.clone());
    wait_for(|| !executor.is_running()).await;
    assert_eq!(snapshot(&inbound), vec![vec![0x05]]);
}

// ══════════════════════════════════════════════════════════════════════════════
//  Queue and validation laws
// ══════════════════════════════════════════════════════════════════════════════

/// A full neighbour queue drops the chunk without stopping the sender.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_neighbour_queue_drops_and_continues() {
    let (lower, lower_inbound, _) = recording_layer(LayerType::Internet, 8, true);
    let upper = Layer::new(LayerType::Transport, config(1), Passthrough);
    Layer::link(&lower, &upper).unwrap();

    for b in 1..=3u8 {
        lower.enqueue_inbound(chunk(&[b])).unwrap();
    }

    let executor = SingleWorkerExecutor::new();
    executor.start(lower.clone());
    wait_for(|| snapshot(&lower_inbound).len() == 3).await;
    settle().await;

    assert!(executor.is_running());
    assert_eq!(upper.inbound_queue().len(), 1);
    let kept = upper.inbound_queue().try_take().unwrap();
    assert_eq!(kept.payload().as_bytes(), &[1]);
    executor.stop();
}

/// The queue never grows past its configured capacity.
#[test]
fn test_enqueue_respects_capacity() {
    let layer = Layer::new(LayerType::Ethernet, config(3), Passthrough);
    let results: Vec<_> = (0..5u8).map(|b| layer.enqueue_inbound(chunk(&[b]))).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(matches!(
        results[4],
        Err(LayerError::QueueFull { capacity: 3, .. })
    ));
    assert_eq!(layer.inbound_queue().len(), 3);
}

/// Only chunks under the empty header may cross a boundary.
#[test]
fn test_enqueue_validates_headers() {
    let layer = Layer::new(LayerType::Internet, config(4), Passthrough);

    let mut headless = chunk(&[0x01]);
    headless.take_header();
    assert_eq!(
        layer.enqueue_inbound(headless).unwrap_err(),
        LayerError::MissingHeader
    );

    let tagged = Chunk::new(
        Arc::new(OpaqueHeader::new("udp", vec![0x00, 0x35])),
        Payload::from(vec![0x01]),
    );
    assert_eq!(
        layer.enqueue_outbound(tagged).unwrap_err(),
        LayerError::MalformedHeader { kind: "udp" }
    );

    assert!(layer.inbound_queue().is_empty());
    assert!(layer.outbound_queue().is_empty());
}
