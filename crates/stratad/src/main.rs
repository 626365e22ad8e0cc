//! stratad — echo daemon over a four-layer strata stack.
//!
//! Reads hex-encoded frames from stdin, one per line, pushes them up through
//! Ethernet → Internet → Transport → Application, and the application layer
//! sends each one straight back down. Frames leaving the bottom layer are
//! printed to stdout as hex.
//!
//!   echo 0102 | RUST_LOG=info stratad

use std::io::BufReader;
use std::time::Duration;

use anyhow::{Context, Result};

use strata_core::{
    BoundaryHandler, FramePump, LayerType, Passthrough, RawConverter, StackBuilder, StackConfig,
};

mod echo;
mod frames;

use echo::Echo;
use frames::{HexConverter, HexLineSink, LineSource};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let result = runtime.block_on(run());
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn run() -> Result<()> {
    // Load config
    if let Err(e) = StackConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = StackConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        StackConfig::default()
    });

    let stack = StackBuilder::new(config)
        .layer(
            LayerType::Ethernet,
            BoundaryHandler::new(RawConverter, HexLineSink::new(std::io::stdout())),
        )
        .layer(LayerType::Internet, Passthrough)
        .layer(LayerType::Transport, Passthrough)
        .layer(LayerType::Application, Echo)
        .build()
        .context("failed to assemble stack")?;

    stack.start();
    tracing::info!("stratad running");

    let source = LineSource::new(BufReader::new(std::io::stdin()));
    let mut pump = FramePump::spawn(source, HexConverter, stack.bottom().clone());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            pump.stop();
        }
        delivered = pump.join() => {
            let delivered = delivered.context("frame pump panicked")?;
            tracing::info!(delivered, "input closed");
            drain(&stack).await;
        }
    }

    stack.stop();
    tracing::info!("stratad stopped");
    Ok(())
}

/// Give in-flight chunks a moment to reach the bottom before stopping.
async fn drain(stack: &strata_core::Stack) {
    for _ in 0..100 {
        let idle = stack
            .layers()
            .iter()
            .all(|l| l.inbound_queue().is_empty() && l.outbound_queue().is_empty());
        if idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // The last dequeued chunk may still be inside a hook.
    tokio::time::sleep(Duration::from_millis(20)).await;
}
