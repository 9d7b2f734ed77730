//! Thread-safe index lifecycle management.
//!
//! [`IndexManager`] owns one nearest-neighbor backend together with its
//! identifier bookkeeping, result cache, optimizer, and persistence
//! tracking, all behind a single mutex. Mutations invalidate the cache
//! before returning, so a caller that observes its own write never sees a
//! stale cached result. There are no background threads: optimization and
//! timed backups piggyback on the mutation that makes them due.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{IndexBackend, create_backend};
use crate::cache::{CacheStats, QueryKeyTracker, ResultCache};
use crate::config::{BackendKind, IndexConfiguration};
use crate::consistency::{self, ValidationReport};
use crate::error::{Result, SimdexError};
use crate::identity::IdentityMap;
use crate::metrics::PerformanceMetrics;
use crate::normalize::VectorNormalizer;
use crate::optimize::OptimizationScheduler;
use crate::persist::{self, PersistenceManager};
use crate::types::{SearchHit, SearchParams, SearchResults, VectorRecord};

/// Point-in-time snapshot of a manager's state, for diagnostics.
#[derive(Debug, Clone)]
pub struct IndexStats {
    /// Backend kind name.
    pub backend_kind: &'static str,
    /// Live (addressable) vectors.
    pub live_count: usize,
    /// Tombstoned positions awaiting the next rebuild.
    pub tombstone_count: usize,
    /// Operation counters and latency averages.
    pub metrics: PerformanceMetrics,
    /// Result cache counters.
    pub cache: CacheStats,
    /// Mutations accumulated toward the next optimization pass.
    pub pending_mutations: usize,
    /// Current backend search breadth, zero for kinds without one.
    pub search_breadth: usize,
}

struct ManagerInner {
    config: IndexConfiguration,
    backend: Box<dyn IndexBackend>,
    identity: IdentityMap,
    records: AHashMap<String, VectorRecord>,
    cache: ResultCache,
    ttl: QueryKeyTracker,
    normalizer: VectorNormalizer,
    scheduler: OptimizationScheduler,
    persistence: PersistenceManager,
    metrics: PerformanceMetrics,
    save_prefix: Option<PathBuf>,
}

/// Thread-safe manager for one vector index.
///
/// All methods take `&self`; interior state is guarded by a mutex, so the
/// manager can be shared across threads behind an `Arc`.
pub struct IndexManager {
    inner: Mutex<ManagerInner>,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Leading slice of `vectors` bounded by the configured training sample
/// size, for backend kinds with a training pass.
fn training_sample<'a>(config: &IndexConfiguration, vectors: &'a [Vec<f32>]) -> &'a [Vec<f32>] {
    let cap = match config.backend {
        BackendKind::Ivf(p) | BackendKind::IvfQuantized(p) => p.train_sample,
        _ => usize::MAX,
    };
    &vectors[..vectors.len().min(cap)]
}

impl IndexManager {
    /// Create an empty managed index.
    pub fn new(config: IndexConfiguration) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(&config)?;
        let inner = ManagerInner {
            normalizer: VectorNormalizer::new(config.metric, config.dimension),
            cache: ResultCache::new(config.cache_capacity),
            ttl: QueryKeyTracker::new(Duration::from_secs(config.cache_ttl_secs)),
            scheduler: OptimizationScheduler::new(config.optimize_threshold),
            persistence: PersistenceManager::new(config.backup_interval_secs),
            backend,
            identity: IdentityMap::new(),
            records: AHashMap::new(),
            metrics: PerformanceMetrics::default(),
            save_prefix: None,
            config,
        };
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Load a managed index from a persisted bundle.
    ///
    /// The loaded state is validated; recoverable inconsistencies are
    /// repaired and logged rather than failing the load.
    pub fn load(prefix: impl AsRef<Path>) -> Result<Self> {
        let prefix = prefix.as_ref();
        let bundle = persist::load_bundle(prefix)?;
        let config = bundle.config;
        let mut identity = bundle.identity;
        let mut records = bundle.records;

        let report = consistency::validate(bundle.backend.as_ref(), &identity, &records);
        if !report.is_consistent() {
            warn!(
                prefix = %prefix.display(),
                issues = report.issues.len(),
                "loaded bundle is inconsistent, repairing"
            );
            for action in consistency::repair(bundle.backend.as_ref(), &mut identity, &mut records)
            {
                warn!(prefix = %prefix.display(), action, "repair");
            }
            let remaining = consistency::validate(bundle.backend.as_ref(), &identity, &records);
            if !remaining.is_consistent() {
                return Err(SimdexError::consistency(format!(
                    "bundle at {} has {} unrepairable issues: {}",
                    prefix.display(),
                    remaining.issues.len(),
                    remaining.issues.join("; ")
                )));
            }
        }

        let inner = ManagerInner {
            normalizer: VectorNormalizer::new(config.metric, config.dimension),
            cache: ResultCache::new(config.cache_capacity),
            ttl: QueryKeyTracker::new(Duration::from_secs(config.cache_ttl_secs)),
            scheduler: OptimizationScheduler::new(config.optimize_threshold),
            persistence: PersistenceManager::new(config.backup_interval_secs),
            backend: bundle.backend,
            identity,
            records,
            metrics: bundle.metrics,
            save_prefix: Some(prefix.to_path_buf()),
            config,
        };
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// The configuration this manager was created with.
    pub fn config(&self) -> IndexConfiguration {
        self.inner.lock().config.clone()
    }

    /// Number of live vectors.
    pub fn len(&self) -> usize {
        self.inner.lock().identity.live_count()
    }

    /// Whether the index has no live vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live vector exists under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().identity.position_of(id).is_some()
    }

    /// Fetch the record stored under `id`.
    pub fn record(&self, id: &str) -> Option<VectorRecord> {
        self.inner.lock().records.get(id).cloned()
    }

    /// Add one vector under a unique external identifier.
    pub fn add(
        &self,
        id: &str,
        vector: &[f32],
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.add_batch(vec![(id.to_string(), vector.to_vec(), metadata)])
    }

    /// Add a batch of vectors atomically: either every entry is accepted
    /// or none is.
    pub fn add_batch(
        &self,
        entries: Vec<(String, Vec<f32>, HashMap<String, String>)>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        let started = Instant::now();
        match Self::add_batch_inner(&mut inner, entries) {
            Ok(count) => {
                let latency = elapsed_ms(started);
                for _ in 0..count {
                    inner.metrics.record_add(latency);
                    inner.scheduler.record_mutation();
                }
                Self::refresh_gauges(&mut inner);
                inner.cache.invalidate_all();
                Self::maybe_optimize(&mut inner);
                Self::maybe_backup(&mut inner);
                Ok(())
            }
            Err(e) => {
                inner.metrics.record_error();
                Err(e)
            }
        }
    }

    fn add_batch_inner(
        inner: &mut ManagerInner,
        entries: Vec<(String, Vec<f32>, HashMap<String, String>)>,
    ) -> Result<usize> {
        // Reject duplicates before any state changes so the batch is
        // all-or-nothing.
        let mut batch_ids = ahash::AHashSet::with_capacity(entries.len());
        for (id, _, _) in &entries {
            if inner.identity.position_of(id).is_some() || !batch_ids.insert(id.as_str()) {
                return Err(SimdexError::DuplicateIdentifier(id.clone()));
            }
        }

        let raw: Vec<Vec<f32>> = entries.iter().map(|(_, v, _)| v.clone()).collect();
        let normalized = inner.normalizer.normalize_batch(&raw)?;

        if inner.backend.requires_training() && !inner.backend.is_trained() {
            let sample = training_sample(&inner.config, &normalized);
            inner.backend.train(sample)?;
        }
        let positions = inner.backend.add(&normalized)?;

        for ((id, vector, metadata), position) in entries.into_iter().zip(positions) {
            let assigned = inner.identity.assign(&id)?;
            debug_assert_eq!(assigned, position);
            inner.records.insert(
                id.clone(),
                VectorRecord {
                    id,
                    position,
                    inserted_at: Utc::now(),
                    metadata,
                    norm: VectorNormalizer::norm(&vector),
                },
            );
        }
        Ok(raw.len())
    }

    /// Search for the `k` most similar vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<SearchResults> {
        self.search_with_params(query, k, SearchParams::default())
    }

    /// Search with per-query parameter overrides.
    ///
    /// Hits are returned in descending similarity order; tombstoned
    /// vectors never appear. An empty index yields an empty result, not
    /// an error.
    pub fn search_with_params(
        &self,
        query: &[f32],
        k: usize,
        params: SearchParams,
    ) -> Result<SearchResults> {
        let mut inner = self.inner.lock();
        let started = Instant::now();
        match Self::search_inner(&mut inner, query, k, params) {
            Ok(results) => {
                inner.metrics.record_search(elapsed_ms(started));
                Ok(results)
            }
            Err(e) => {
                inner.metrics.record_error();
                Err(e)
            }
        }
    }

    fn search_inner(
        inner: &mut ManagerInner,
        query: &[f32],
        k: usize,
        params: SearchParams,
    ) -> Result<SearchResults> {
        let normalized = inner.normalizer.normalize(query)?;
        if k == 0 || inner.identity.live_count() == 0 {
            return Ok(SearchResults::default());
        }

        let key = inner.cache.key_for(&normalized, k, &params);
        if let Some(cached) = inner.cache.get(key) {
            inner.metrics.record_cache(true);
            return Ok(cached);
        }
        inner.metrics.record_cache(false);

        // Oversample by the tombstone count so dropped hits cannot leave
        // the result short.
        let fetch_k = (k + inner.identity.tombstone_count()).min(inner.backend.count());

        let previous_breadth = inner.backend.search_breadth();
        if let Some(breadth) = params.breadth {
            inner.backend.set_search_breadth(breadth);
        }
        let candidates = inner.backend.search(&normalized, fetch_k);
        if params.breadth.is_some() {
            inner.backend.set_search_breadth(previous_breadth);
        }
        let candidates = candidates?;

        let metric = inner.config.metric;
        let mut hits = Vec::with_capacity(k);
        for (position, distance) in candidates {
            let Some(id) = inner.identity.identifier_of(position) else {
                continue;
            };
            hits.push(SearchHit {
                id: id.to_string(),
                score: metric.to_similarity(distance),
            });
            if hits.len() == k {
                break;
            }
        }
        let results = SearchResults { hits };

        let ttl = inner.ttl.ttl_for(key);
        inner.cache.put(key, results.clone(), ttl);
        Ok(results)
    }

    /// Remove the vector stored under `id`.
    ///
    /// The position is tombstoned; the physical vector is reclaimed by
    /// the next rebuild.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.identity.remove(id) {
            Ok(position) => {
                inner.records.remove(id);
                debug!(id, position, "tombstoned vector");
                inner.scheduler.record_mutation();
                Self::refresh_gauges(&mut inner);
                inner.cache.invalidate_all();
                Self::maybe_optimize(&mut inner);
                Self::maybe_backup(&mut inner);
                Ok(())
            }
            Err(e) => {
                inner.metrics.record_error();
                Err(e)
            }
        }
    }

    /// Rebuild the backend from live vectors, reclaiming tombstones and
    /// resetting performance counters.
    pub fn rebuild(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::rebuild_backend(&mut inner)?;
        inner.metrics.reset();
        Self::refresh_gauges(&mut inner);
        Ok(())
    }

    /// Validate cross-structure invariants without modifying anything.
    pub fn validate(&self) -> ValidationReport {
        let inner = self.inner.lock();
        consistency::validate(inner.backend.as_ref(), &inner.identity, &inner.records)
    }

    /// Repair any inconsistencies, returning the actions taken.
    pub fn repair(&self) -> Vec<String> {
        let mut inner = self.inner.lock();
        let ManagerInner {
            backend,
            identity,
            records,
            ..
        } = &mut *inner;
        let actions = consistency::repair(backend.as_ref(), identity, records);
        if !actions.is_empty() {
            inner.cache.invalidate_all();
            Self::refresh_gauges(&mut inner);
        }
        actions
    }

    /// Persist the index to a bundle under `prefix`. Subsequent timed
    /// backups reuse this prefix.
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<()> {
        let prefix = prefix.as_ref();
        let mut inner = self.inner.lock();
        persist::save_bundle(
            prefix,
            &inner.config,
            inner.backend.as_ref(),
            &inner.identity,
            &inner.records,
            &inner.metrics,
        )?;
        inner.save_prefix = Some(prefix.to_path_buf());
        inner.persistence.mark_backed_up();
        Ok(())
    }

    /// Current counters, sizes, and cache statistics.
    pub fn stats(&self) -> IndexStats {
        let mut inner = self.inner.lock();
        Self::refresh_gauges(&mut inner);
        IndexStats {
            backend_kind: inner.backend.kind_name(),
            live_count: inner.identity.live_count(),
            tombstone_count: inner.identity.tombstone_count(),
            metrics: inner.metrics.clone(),
            cache: inner.cache.stats(),
            pending_mutations: inner.scheduler.pending_mutations(),
            search_breadth: inner.backend.search_breadth(),
        }
    }

    fn refresh_gauges(inner: &mut ManagerInner) {
        let live = inner.identity.live_count();
        let memory = inner.backend.estimated_memory();
        inner.metrics.set_gauges(live, memory);
    }

    /// Build a fresh backend from live vectors and swap it in. The old
    /// backend keeps serving until the swap, and a failure leaves it
    /// untouched.
    fn rebuild_backend(inner: &mut ManagerInner) -> Result<()> {
        let started = Instant::now();
        let positions = inner.identity.positions();

        let mut ids = Vec::with_capacity(positions.len());
        let mut vectors = Vec::with_capacity(positions.len());
        for &position in &positions {
            let Some(id) = inner.identity.identifier_of(position) else {
                continue;
            };
            vectors.push(inner.backend.reconstruct(position)?);
            ids.push(id.to_string());
        }

        let mut fresh = create_backend(&inner.config)?;
        if fresh.requires_training() && !vectors.is_empty() {
            fresh.train(training_sample(&inner.config, &vectors))?;
        }
        let mut identity = IdentityMap::new();
        if !vectors.is_empty() {
            let positions = fresh.add(&vectors)?;
            for (id, position) in ids.iter().zip(positions) {
                let assigned = identity.assign(id)?;
                debug_assert_eq!(assigned, position);
                if let Some(record) = inner.records.get_mut(id) {
                    record.position = position;
                }
            }
        }
        fresh.set_search_breadth(OptimizationScheduler::recommended_breadth(fresh.count()));

        inner.backend = fresh;
        inner.identity = identity;
        inner.cache.invalidate_all();
        info!(
            vectors = inner.identity.live_count(),
            elapsed_ms = elapsed_ms(started),
            "rebuilt backend"
        );
        Ok(())
    }

    /// Run a scheduled optimization pass if one is due. Only the
    /// trainable backend family is rebuilt; the other kinds get a
    /// runtime search-breadth adjustment instead, leaving positions
    /// untouched. Failures are logged and retried on a later trigger
    /// instead of failing the mutation that got us here.
    fn maybe_optimize(inner: &mut ManagerInner) {
        if !inner.scheduler.is_due() || !inner.scheduler.begin() {
            return;
        }
        if inner.backend.requires_training() {
            let outcome = Self::rebuild_backend(inner);
            inner.scheduler.finish(outcome.is_ok());
            if let Err(e) = outcome {
                inner.metrics.record_error();
                warn!(error = %e, "optimization pass failed");
            }
        } else {
            let breadth = OptimizationScheduler::recommended_breadth(inner.backend.count());
            inner.backend.set_search_breadth(breadth);
            inner.scheduler.finish(true);
            debug!(breadth, "retuned search breadth");
        }
    }

    /// Write a timed backup if the interval elapsed and a save prefix is
    /// known. Backup failures are logged, never propagated.
    fn maybe_backup(inner: &mut ManagerInner) {
        if !inner.persistence.backup_due() {
            return;
        }
        let Some(prefix) = inner.save_prefix.clone() else {
            return;
        };
        let backup = PersistenceManager::backup_prefix(&prefix);
        match persist::save_bundle(
            &backup,
            &inner.config,
            inner.backend.as_ref(),
            &inner.identity,
            &inner.records,
            &inner.metrics,
        ) {
            Ok(()) => {
                inner.persistence.mark_backed_up();
                info!(prefix = %backup.display(), "wrote timed backup");
            }
            Err(e) => warn!(error = %e, "timed backup failed"),
        }
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("IndexManager")
            .field("backend", &inner.backend.kind_name())
            .field("live", &inner.identity.live_count())
            .field("tombstones", &inner.identity.tombstone_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::distance::DistanceMetric;

    fn flat_manager(dimension: usize) -> IndexManager {
        let config =
            IndexConfiguration::new(DistanceMetric::InnerProduct, BackendKind::Flat, dimension)
                .with_optimize_threshold(0);
        IndexManager::new(config).unwrap()
    }

    #[test]
    fn test_add_and_search_round_trip() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        manager.add("b", &[0.0, 1.0], HashMap::new()).unwrap();
        let results = manager.search(&[1.0, 0.1], 1).unwrap();
        assert_eq!(results.ids(), vec!["a"]);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected_without_side_effects() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        let err = manager.add("a", &[0.0, 1.0], HashMap::new()).unwrap_err();
        assert!(matches!(err, SimdexError::DuplicateIdentifier(_)));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.stats().metrics.total_errors, 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let manager = flat_manager(3);
        let err = manager.add("a", &[1.0], HashMap::new()).unwrap_err();
        assert!(matches!(err, SimdexError::DimensionMismatch { .. }));
        assert!(matches!(
            manager.search(&[1.0], 1).unwrap_err(),
            SimdexError::DimensionMismatch { .. }
        ));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        let err = manager
            .add_batch(vec![
                ("b".into(), vec![0.0, 1.0], HashMap::new()),
                ("a".into(), vec![1.0, 1.0], HashMap::new()),
            ])
            .unwrap_err();
        assert!(matches!(err, SimdexError::DuplicateIdentifier(_)));
        assert_eq!(manager.len(), 1);
        assert!(!manager.contains("b"));
    }

    #[test]
    fn test_empty_index_searches_empty() {
        let manager = flat_manager(2);
        let results = manager.search(&[1.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_removed_vectors_never_surface() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        manager.add("b", &[0.9, 0.1], HashMap::new()).unwrap();
        manager.remove("a").unwrap();
        let results = manager.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.ids(), vec!["b"]);
        assert!(!manager.contains("a"));
        assert!(matches!(
            manager.remove("a").unwrap_err(),
            SimdexError::NotFound(_)
        ));
    }

    #[test]
    fn test_mutation_invalidates_cached_results() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        let first = manager.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(first.ids(), vec!["a"]);
        manager.add("b", &[1.0, 0.0], HashMap::new()).unwrap();
        let second = manager.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_repeated_search_hits_cache() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        manager.search(&[1.0, 0.0], 1).unwrap();
        manager.search(&[1.0, 0.0], 1).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.metrics.cache_hits, 1);
        assert_eq!(stats.metrics.cache_misses, 1);
    }

    #[test]
    fn test_rebuild_reclaims_tombstones_and_resets_counters() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        manager.add("b", &[0.0, 1.0], HashMap::new()).unwrap();
        manager.remove("a").unwrap();
        assert_eq!(manager.stats().tombstone_count, 1);

        manager.rebuild().unwrap();
        let stats = manager.stats();
        assert_eq!(stats.tombstone_count, 0);
        assert_eq!(stats.live_count, 1);
        assert_eq!(stats.metrics.total_adds, 0);
        let results = manager.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(results.ids(), vec!["b"]);
    }

    #[test]
    fn test_optimizer_leaves_non_training_positions_alone() {
        let config =
            IndexConfiguration::new(DistanceMetric::InnerProduct, BackendKind::Flat, 2)
                .with_optimize_threshold(4);
        let manager = IndexManager::new(config).unwrap();
        for i in 0..3 {
            manager
                .add(&format!("v{i}"), &[i as f32 + 1.0, 1.0], HashMap::new())
                .unwrap();
        }
        manager.remove("v0").unwrap();
        // Fourth mutation crossed the threshold, but a flat backend is
        // never rebuilt by the optimizer: the tombstone stays until an
        // explicit rebuild and positions do not move.
        let stats = manager.stats();
        assert_eq!(stats.pending_mutations, 0);
        assert_eq!(stats.tombstone_count, 1);
        assert_eq!(stats.live_count, 2);
        assert_eq!(manager.record("v1").unwrap().position, 1);
        assert_eq!(manager.record("v2").unwrap().position, 2);
    }

    #[test]
    fn test_optimizer_retunes_breadth_for_graph_backend() {
        let config = IndexConfiguration::new(
            DistanceMetric::InnerProduct,
            BackendKind::Hnsw(crate::config::HnswParams::default()),
            2,
        )
        .with_optimize_threshold(3);
        let manager = IndexManager::new(config).unwrap();
        assert_eq!(manager.stats().search_breadth, 64);
        for i in 0..3 {
            manager
                .add(&format!("v{i}"), &[i as f32 + 1.0, 1.0], HashMap::new())
                .unwrap();
        }
        let stats = manager.stats();
        assert_eq!(stats.pending_mutations, 0);
        assert_eq!(
            stats.search_breadth,
            OptimizationScheduler::recommended_breadth(3)
        );
        // Positions were not reassigned.
        assert_eq!(manager.record("v0").unwrap().position, 0);
    }

    #[test]
    fn test_optimizer_rebuilds_trainable_backend() {
        let config = IndexConfiguration::new(
            DistanceMetric::Euclidean,
            BackendKind::Ivf(crate::config::IvfParams {
                n_clusters: 2,
                n_probe: 2,
                train_sample: 1024,
            }),
            2,
        )
        .with_optimize_threshold(4);
        let manager = IndexManager::new(config).unwrap();
        for i in 0..3 {
            manager
                .add(&format!("v{i}"), &[i as f32, 0.0], HashMap::new())
                .unwrap();
        }
        manager.remove("v0").unwrap();
        // Fourth mutation crossed the threshold; the inverted-file
        // backend is retrained from live vectors and tombstones are
        // reclaimed.
        let stats = manager.stats();
        assert_eq!(stats.pending_mutations, 0);
        assert_eq!(stats.tombstone_count, 0);
        assert_eq!(stats.live_count, 2);
        assert!(manager.validate().is_consistent());
    }

    #[test]
    fn test_validate_clean_manager() {
        let manager = flat_manager(2);
        manager.add("a", &[1.0, 0.0], HashMap::new()).unwrap();
        assert!(manager.validate().is_consistent());
        assert!(manager.repair().is_empty());
    }

    #[test]
    fn test_record_carries_metadata_and_norm() {
        let manager = flat_manager(2);
        let mut metadata = HashMap::new();
        metadata.insert("user".to_string(), "u1".to_string());
        manager.add("a", &[3.0, 4.0], metadata).unwrap();
        let record = manager.record("a").unwrap();
        assert_eq!(record.metadata.get("user").unwrap(), "u1");
        assert!((record.norm - 5.0).abs() < 1e-6);
        assert_eq!(record.position, 0);
    }
}
