//! Configuration for the storage engines.
//!
//! Each payload type gets its own engine with its own batch size and flush
//! interval; the presets mirror what the production deployment runs with.
//! These are plain structs, not subclasses of anything: an engine is
//! parameterized, never specialized.

use std::time::Duration;

/// Default maximum rows per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Default maximum time a batch stays open before being flushed.
pub const DEFAULT_MAX_BATCH_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for one [`crate::engine::BatchEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Flush as soon as this many rows have been executed into the
    /// current transaction. Also sizes the ingestion channel (twice this
    /// value), which is the backpressure bound on producers.
    pub max_batch_size: usize,

    /// Flush on this period regardless of batch size.
    pub max_batch_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_interval: DEFAULT_MAX_BATCH_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Preset for DAO lifecycle events: low volume.
    pub fn daos() -> Self {
        Self::default()
    }

    /// Preset for proposal lifecycle events: low volume.
    pub fn proposals() -> Self {
        Self::default()
    }

    /// Preset for votes: the highest-volume stream by two orders of
    /// magnitude.
    pub fn votes() -> Self {
        Self {
            max_batch_size: 50_000,
            ..Self::default()
        }
    }

    /// Preset for token price points.
    pub fn token_prices() -> Self {
        Self {
            max_batch_size: 50_000,
            ..Self::default()
        }
    }
}
