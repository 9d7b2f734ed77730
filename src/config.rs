//! Index configuration types.
//!
//! An [`IndexConfiguration`] is immutable after creation and travels with
//! the persisted bundle; the backend kind is fixed for the lifetime of a
//! bundle unless an explicit rebuild is requested.

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{Result, SimdexError};

/// Parameters for inverted-file backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of coarse clusters. `0` selects `sqrt(n)` at training time.
    pub n_clusters: usize,
    /// Number of clusters scanned per query.
    pub n_probe: usize,
    /// Upper bound on the number of vectors sampled for (re)training.
    pub train_sample: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            n_clusters: 0,
            n_probe: 8,
            train_sample: 16_384,
        }
    }
}

/// Parameters for the graph (HNSW) backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Maximum neighbors per node on upper layers.
    pub m: usize,
    /// Candidate list width during construction.
    pub ef_construction: usize,
    /// Candidate list width during search.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// Parameters for the hashing (LSH) backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    /// Number of independent hash tables.
    pub n_tables: usize,
    /// Hyperplanes (bits) per table.
    pub n_bits: usize,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            n_tables: 8,
            n_bits: 12,
        }
    }
}

/// The kind of nearest-neighbor structure backing the index, with its
/// construction-time tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum BackendKind {
    /// Exact brute-force scan.
    Flat,
    /// Inverted-file with a trained coarse quantizer.
    Ivf(IvfParams),
    /// Inverted-file with 8-bit scalar-quantized storage and
    /// full-precision rerank.
    IvfQuantized(IvfParams),
    /// Layered small-world graph.
    Hnsw(HnswParams),
    /// Random-hyperplane hashing.
    Lsh(LshParams),
}

impl BackendKind {
    /// Stable name used for artifact tagging and display.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Flat => "flat",
            BackendKind::Ivf(_) => "ivf",
            BackendKind::IvfQuantized(_) => "ivf_quantized",
            BackendKind::Hnsw(_) => "hnsw",
            BackendKind::Lsh(_) => "lsh",
        }
    }

    /// Whether this kind needs a training pass before vectors can be added.
    pub fn requires_training(&self) -> bool {
        matches!(self, BackendKind::Ivf(_) | BackendKind::IvfQuantized(_))
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Configuration for an index manager instance.
///
/// Immutable after creation. Use the `with_*` methods to adjust knobs
/// before the manager is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfiguration {
    /// Distance metric for ranking.
    pub metric: DistanceMetric,
    /// Backend kind and tuning parameters.
    pub backend: BackendKind,
    /// Vector dimension. Must be greater than zero.
    pub dimension: usize,
    /// Maximum number of memoized query results.
    pub cache_capacity: usize,
    /// Base TTL for cached query results, in seconds.
    pub cache_ttl_secs: u64,
    /// Mutations between optimization passes. `0` disables the optimizer.
    pub optimize_threshold: usize,
    /// Seconds between timed backups. `0` disables backups.
    pub backup_interval_secs: u64,
}

impl IndexConfiguration {
    /// Create a configuration with default cache/optimizer/backup knobs.
    pub fn new(metric: DistanceMetric, backend: BackendKind, dimension: usize) -> Self {
        Self {
            metric,
            backend,
            dimension,
            cache_capacity: 1024,
            cache_ttl_secs: 300,
            optimize_threshold: 1000,
            backup_interval_secs: 0,
        }
    }

    /// Set the result cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the base result cache TTL in seconds.
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    /// Set the mutation count that triggers an optimization pass.
    pub fn with_optimize_threshold(mut self, threshold: usize) -> Self {
        self.optimize_threshold = threshold;
        self
    }

    /// Set the timed-backup interval in seconds.
    pub fn with_backup_interval_secs(mut self, secs: u64) -> Self {
        self.backup_interval_secs = secs;
        self
    }

    /// Validate this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(SimdexError::invalid_config("dimension must be greater than zero"));
        }
        if self.cache_capacity == 0 {
            return Err(SimdexError::invalid_config(
                "cache capacity must be greater than zero",
            ));
        }
        match &self.backend {
            BackendKind::Ivf(p) | BackendKind::IvfQuantized(p) => {
                if p.n_probe == 0 {
                    return Err(SimdexError::invalid_config("n_probe must be at least 1"));
                }
                if p.train_sample == 0 {
                    return Err(SimdexError::invalid_config(
                        "train_sample must be at least 1",
                    ));
                }
            }
            BackendKind::Hnsw(p) => {
                if p.m == 0 || p.ef_construction == 0 || p.ef_search == 0 {
                    return Err(SimdexError::invalid_config(
                        "hnsw parameters must be at least 1",
                    ));
                }
            }
            BackendKind::Lsh(p) => {
                if p.n_tables == 0 || p.n_bits == 0 || p.n_bits > 64 {
                    return Err(SimdexError::invalid_config(
                        "lsh requires 1..=64 bits and at least one table",
                    ));
                }
            }
            BackendKind::Flat => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimension_rejected() {
        let config =
            IndexConfiguration::new(DistanceMetric::InnerProduct, BackendKind::Flat, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_knobs_validate() {
        let config = IndexConfiguration::new(
            DistanceMetric::Euclidean,
            BackendKind::Ivf(IvfParams::default()),
            64,
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_lsh_bits_rejected() {
        let config = IndexConfiguration::new(
            DistanceMetric::InnerProduct,
            BackendKind::Lsh(LshParams {
                n_tables: 4,
                n_bits: 80,
            }),
            64,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = IndexConfiguration::new(
            DistanceMetric::InnerProduct,
            BackendKind::Hnsw(HnswParams::default()),
            128,
        )
        .with_cache_capacity(16);
        let json = serde_json::to_string(&config).unwrap();
        let back: IndexConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
