//! Simdex is a thread-safe manager for approximate nearest-neighbor
//! vector indexes.
//!
//! It wraps a pluggable backend (exact scan, inverted-file with optional
//! scalar quantization, layered graph, or random-hyperplane hashing) with
//! the bookkeeping a long-lived similarity service needs:
//!
//! - stable external identifiers mapped to backend positions, with
//!   tombstoned removal and rebuild-time reclamation
//! - metric-appropriate normalization so inner-product scores are cosine
//!   similarity
//! - a TTL/LRU result cache invalidated on every mutation
//! - mutation-driven optimization that rebuilds and retunes the backend
//! - checksummed multi-artifact persistence with timed backups
//! - consistency validation and repair between backend and bookkeeping
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use simdex::{BackendKind, DistanceMetric, IndexConfiguration, IndexManager};
//!
//! # fn main() -> simdex::Result<()> {
//! let config = IndexConfiguration::new(DistanceMetric::InnerProduct, BackendKind::Flat, 4);
//! let manager = IndexManager::new(config)?;
//!
//! manager.add("moisturizer-7", &[0.1, 0.9, 0.2, 0.1], HashMap::new())?;
//! manager.add("serum-3", &[0.8, 0.1, 0.1, 0.3], HashMap::new())?;
//!
//! let results = manager.search(&[0.1, 0.8, 0.3, 0.1], 1)?;
//! assert_eq!(results.ids(), vec!["moisturizer-7"]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod consistency;
pub mod distance;
pub mod error;
pub mod identity;
pub mod manager;
pub mod metrics;
pub mod normalize;
pub mod optimize;
pub mod persist;
pub mod types;

pub use backend::{FlatBackend, HnswBackend, IndexBackend, IvfBackend, LshBackend};
pub use cache::{CacheStats, ResultCache};
pub use config::{BackendKind, HnswParams, IndexConfiguration, IvfParams, LshParams};
pub use consistency::ValidationReport;
pub use distance::DistanceMetric;
pub use error::{Result, SimdexError};
pub use identity::IdentityMap;
pub use manager::{IndexManager, IndexStats};
pub use metrics::PerformanceMetrics;
pub use normalize::VectorNormalizer;
pub use optimize::OptimizationScheduler;
pub use types::{SearchHit, SearchParams, SearchResults, VectorRecord};
