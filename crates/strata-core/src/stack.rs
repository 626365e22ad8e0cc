//! Stack assembly: layers built from config, wired bottom to top, and
//! driven by one executor each.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{ConfigError, StackConfig};
use crate::exception::LayerError;
use crate::executor::{LayerExecutor, SingleWorkerExecutor};
use crate::layer::{Layer, LayerHandler, LayerType};

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct StackBuilder {
    config: StackConfig,
    layers: Vec<(LayerType, Box<dyn LayerHandler>)>,
}

impl StackBuilder {
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            layers: Vec::new(),
        }
    }

    /// Push the next layer. Layers are listed bottom first.
    pub fn layer(mut self, kind: LayerType, handler: impl LayerHandler) -> Self {
        self.layers.push((kind, Box::new(handler)));
        self
    }

    pub fn build(self) -> Result<Stack, StackError> {
        if self.layers.is_empty() {
            return Err(StackError::Empty);
        }

        let mut layers: Vec<Arc<Layer>> = Vec::with_capacity(self.layers.len());
        for (kind, handler) in self.layers {
            if layers.iter().any(|l| l.kind() == kind) {
                return Err(StackError::DuplicateLayer(kind));
            }
            let config = self.config.layer_config(kind)?;
            layers.push(Layer::with_handler(kind, config, handler));
        }

        for pair in layers.windows(2) {
            Layer::link(&pair[0], &pair[1])?;
        }

        tracing::debug!(
            layers = %layers.iter().map(|l| l.kind().key()).collect::<Vec<_>>().join(" > "),
            "stack assembled"
        );
        Ok(Stack {
            layers,
            executors: Mutex::new(Vec::new()),
        })
    }
}

// ── Stack ─────────────────────────────────────────────────────────────────────

/// An assembled chain of layers. Owns the layers and their executors.
pub struct Stack {
    layers: Vec<Arc<Layer>>,
    /// Parallel to `layers` once started.
    executors: Mutex<Vec<Box<dyn LayerExecutor>>>,
}

impl Stack {
    /// Drive every layer with a [`SingleWorkerExecutor`] on the current
    /// tokio runtime.
    pub fn start(&self) {
        self.start_with(|_| Box::new(SingleWorkerExecutor::new()));
    }

    /// Drive every layer with an executor from `factory`.
    ///
    /// The factory is consulted on the first start only; later calls restart
    /// the executors already created.
    pub fn start_with<F>(&self, mut factory: F)
    where
        F: FnMut(&Arc<Layer>) -> Box<dyn LayerExecutor>,
    {
        let mut executors = self.executors.lock().unwrap_or_else(PoisonError::into_inner);
        if executors.is_empty() {
            executors.extend(self.layers.iter().map(&mut factory));
        }
        for (layer, executor) in self.layers.iter().zip(executors.iter()) {
            executor.start(layer.clone());
        }
    }

    /// Stop every layer. Queued chunks stay queued.
    pub fn stop(&self) {
        let executors = self.executors.lock().unwrap_or_else(PoisonError::into_inner);
        for executor in executors.iter().rev() {
            executor.stop();
        }
    }

    /// Whether the executor of `kind` is running. `false` for unknown layers
    /// and before the first start.
    pub fn is_running(&self, kind: LayerType) -> bool {
        let executors = self.executors.lock().unwrap_or_else(PoisonError::into_inner);
        self.layers
            .iter()
            .zip(executors.iter())
            .any(|(layer, executor)| layer.kind() == kind && executor.is_running())
    }

    pub fn layer(&self, kind: LayerType) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|l| l.kind() == kind)
    }

    /// Entry point for inbound frames.
    pub fn bottom(&self) -> &Arc<Layer> {
        &self.layers[0]
    }

    pub fn top(&self) -> &Arc<Layer> {
        &self.layers[self.layers.len() - 1]
    }

    /// Layers, bottom first.
    pub fn layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("a stack needs at least one layer")]
    Empty,

    #[error("layer {0} appears twice")]
    DuplicateLayer(LayerType),

    #[error("invalid layer config: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot wire layers: {0}")]
    Wiring(#[from] LayerError),
}
