//! Prefetch configuration.

use rf_arena::ArenaConfig;
use serde::{Deserialize, Serialize};

/// Default number of concurrent chunk downloads.
pub const DEFAULT_PREFETCH_WIDTH: usize = 4;

/// Configuration for the prefetch scheduler.
///
/// The width is resolved by the caller (from session parameters, CLI flags,
/// etc.) and passed in; the scheduler never looks it up itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Maximum chunk downloads in flight (default: 4).
    ///
    /// The effective window is `min(prefetch_width, chunk_count)`.
    #[serde(default = "default_prefetch_width")]
    pub prefetch_width: usize,

    /// Arena sizing and pooling for the chunk stores.
    #[serde(default)]
    pub arena: ArenaConfig,
}

fn default_prefetch_width() -> usize {
    DEFAULT_PREFETCH_WIDTH
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            prefetch_width: default_prefetch_width(),
            arena: ArenaConfig::default(),
        }
    }
}

impl PrefetchConfig {
    /// Create a new prefetch configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prefetch width.
    pub fn with_prefetch_width(mut self, width: usize) -> Self {
        self.prefetch_width = width;
        self
    }

    /// Set the arena configuration.
    pub fn with_arena(mut self, arena: ArenaConfig) -> Self {
        self.arena = arena;
        self
    }

    /// Effective window for a result set of `chunk_count` chunks.
    pub fn window_for(&self, chunk_count: usize) -> usize {
        self.prefetch_width.min(chunk_count)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.prefetch_width == 0 {
            return Err("prefetch_width must be at least 1".to_string());
        }
        self.arena.validate()
    }
}
