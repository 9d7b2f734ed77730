//! Operation counters and latency tracking for a managed index.

use serde::{Deserialize, Serialize};

/// Smoothing factor for the latency moving averages.
const EMA_ALPHA: f64 = 0.1;

/// Counters and gauges exposed through `IndexManager::stats` and persisted
/// alongside the index so history survives restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Vectors accepted since creation or last reset.
    pub total_adds: u64,
    /// Queries served, cached or not.
    pub total_searches: u64,
    /// Operations that returned an error.
    pub total_errors: u64,
    /// Exponential moving average of add latency in milliseconds.
    pub avg_add_latency_ms: f64,
    /// Exponential moving average of search latency in milliseconds.
    pub avg_search_latency_ms: f64,
    /// Live vectors currently addressable.
    pub vector_count: usize,
    /// Rough backend memory footprint in bytes.
    pub estimated_memory_bytes: usize,
    /// Queries answered from the result cache.
    pub cache_hits: u64,
    /// Queries that had to hit the backend.
    pub cache_misses: u64,
}

impl PerformanceMetrics {
    fn ema(current: f64, sample: f64, observations: u64) -> f64 {
        if observations <= 1 {
            sample
        } else {
            EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * current
        }
    }

    /// Record one completed add.
    pub fn record_add(&mut self, latency_ms: f64) {
        self.total_adds += 1;
        self.avg_add_latency_ms = Self::ema(self.avg_add_latency_ms, latency_ms, self.total_adds);
    }

    /// Record one completed search.
    pub fn record_search(&mut self, latency_ms: f64) {
        self.total_searches += 1;
        self.avg_search_latency_ms =
            Self::ema(self.avg_search_latency_ms, latency_ms, self.total_searches);
    }

    /// Record a failed operation.
    pub fn record_error(&mut self) {
        self.total_errors += 1;
    }

    /// Record a cache lookup outcome.
    pub fn record_cache(&mut self, hit: bool) {
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }

    /// Refresh the size gauges.
    pub fn set_gauges(&mut self, vector_count: usize, estimated_memory_bytes: usize) {
        self.vector_count = vector_count;
        self.estimated_memory_bytes = estimated_memory_bytes;
    }

    /// Fraction of lookups served from cache, zero when nothing was looked
    /// up yet.
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Zero every counter and average. Gauges are re-derived by the caller.
    pub fn reset(&mut self) {
        *self = Self {
            vector_count: self.vector_count,
            estimated_memory_bytes: self.estimated_memory_bytes,
            ..Self::default()
        };
    }
}
