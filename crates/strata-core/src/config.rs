//! Configuration for strata stacks.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $STRATA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/strata/config.toml
//!   3. ~/.config/strata/config.toml

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::layer::{Direction, LayerType};

/// Queue capacity used when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Largest capacity a bounded tokio channel can hold.
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

// ── LayerConfig ───────────────────────────────────────────────────────────────

/// Immutable per-layer queue configuration.
///
/// Both capacities are positive and at most [`MAX_QUEUE_CAPACITY`]; anything
/// else fails construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerConfig {
    inbound_queue_capacity: usize,
    outbound_queue_capacity: usize,
}

impl LayerConfig {
    pub fn new(
        inbound_queue_capacity: usize,
        outbound_queue_capacity: usize,
    ) -> Result<Self, ConfigError> {
        check_capacity(Direction::Inbound, inbound_queue_capacity)?;
        check_capacity(Direction::Outbound, outbound_queue_capacity)?;
        Ok(Self {
            inbound_queue_capacity,
            outbound_queue_capacity,
        })
    }

    pub fn builder() -> LayerConfigBuilder {
        LayerConfigBuilder::default()
    }

    pub fn inbound_queue_capacity(&self) -> usize {
        self.inbound_queue_capacity
    }

    pub fn outbound_queue_capacity(&self) -> usize {
        self.outbound_queue_capacity
    }

    pub fn capacity(&self, direction: Direction) -> usize {
        match direction {
            Direction::Inbound => self.inbound_queue_capacity,
            Direction::Outbound => self.outbound_queue_capacity,
        }
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Builder with both capacities defaulting to [`DEFAULT_QUEUE_CAPACITY`].
#[derive(Debug, Clone)]
pub struct LayerConfigBuilder {
    inbound_queue_capacity: usize,
    outbound_queue_capacity: usize,
}

impl Default for LayerConfigBuilder {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl LayerConfigBuilder {
    pub fn inbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.inbound_queue_capacity = capacity;
        self
    }

    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<LayerConfig, ConfigError> {
        LayerConfig::new(self.inbound_queue_capacity, self.outbound_queue_capacity)
    }
}

fn check_capacity(direction: Direction, capacity: usize) -> Result<(), ConfigError> {
    match capacity {
        0 => Err(ConfigError::InvalidCapacity(direction)),
        c if c > MAX_QUEUE_CAPACITY => Err(ConfigError::CapacityTooLarge {
            direction,
            capacity: c,
        }),
        _ => Ok(()),
    }
}

// ── StackConfig ───────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Capacities applied to every layer without an override.
    pub defaults: QueueSettings,
    /// Per-layer overrides, keyed by layer type (`ethernet`, `internet`, ...).
    pub layers: BTreeMap<String, QueueOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub inbound_queue_capacity: usize,
    pub outbound_queue_capacity: usize,
}

/// Override for a single layer. Unset fields fall back to `defaults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_queue_capacity: Option<usize>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("strata")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} queue capacity must be positive")]
    InvalidCapacity(Direction),
    #[error("{direction} queue capacity {capacity} exceeds {}", MAX_QUEUE_CAPACITY)]
    CapacityTooLarge { direction: Direction, capacity: usize },
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Env var suffix for each queue field, shared by the defaults block and
/// every per-layer table.
const ENV_FIELDS: [(&str, Direction); 2] = [
    ("INBOUND_QUEUE_CAPACITY", Direction::Inbound),
    ("OUTBOUND_QUEUE_CAPACITY", Direction::Outbound),
];

impl QueueSettings {
    pub fn capacity(&self, direction: Direction) -> usize {
        match direction {
            Direction::Inbound => self.inbound_queue_capacity,
            Direction::Outbound => self.outbound_queue_capacity,
        }
    }

    fn capacity_mut(&mut self, direction: Direction) -> &mut usize {
        match direction {
            Direction::Inbound => &mut self.inbound_queue_capacity,
            Direction::Outbound => &mut self.outbound_queue_capacity,
        }
    }
}

impl QueueOverride {
    pub fn capacity(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::Inbound => self.inbound_queue_capacity,
            Direction::Outbound => self.outbound_queue_capacity,
        }
    }

    fn capacity_mut(&mut self, direction: Direction) -> &mut Option<usize> {
        match direction {
            Direction::Inbound => &mut self.inbound_queue_capacity,
            Direction::Outbound => &mut self.outbound_queue_capacity,
        }
    }
}

impl StackConfig {
    /// Load config: env vars → file → defaults. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StackConfig::default(),
            Err(e) => return Err(ConfigError::ReadFailed(path, e)),
        };
        config.overlay_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("STRATA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        let text =
            toml::to_string_pretty(&StackConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        Ok(path)
    }

    /// Resolve and validate the queue configuration for one layer.
    pub fn layer_config(&self, kind: LayerType) -> Result<LayerConfig, ConfigError> {
        let over = self.layers.get(kind.key());
        let resolve = |direction: Direction| {
            over.and_then(|o| o.capacity(direction))
                .unwrap_or(self.defaults.capacity(direction))
        };
        LayerConfig::new(resolve(Direction::Inbound), resolve(Direction::Outbound))
    }

    /// Overlay `STRATA_DEFAULTS__<FIELD>` and `STRATA_LAYERS__<TYPE>__<FIELD>`
    /// values. Unparsable values are ignored.
    fn overlay_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: String| lookup(&key).and_then(|v| v.trim().parse::<usize>().ok());

        for (field, direction) in ENV_FIELDS {
            if let Some(n) = read(format!("STRATA_DEFAULTS__{field}")) {
                *self.defaults.capacity_mut(direction) = n;
            }
            for kind in LayerType::ALL {
                let key = format!("STRATA_LAYERS__{}__{field}", kind.key().to_ascii_uppercase());
                if let Some(n) = read(key) {
                    *self
                        .layers
                        .entry(kind.key().to_string())
                        .or_default()
                        .capacity_mut(direction) = Some(n);
                }
            }
        }
    }
}
