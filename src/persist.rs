//! Durable index bundles.
//!
//! A saved index is a set of sibling artifacts sharing one path prefix:
//! a human-readable configuration, the serialized backend, the identifier
//! bookkeeping, and the performance counters. Binary artifacts travel in a
//! checksummed envelope so corruption is detected at load time instead of
//! surfacing as garbage results. Every artifact is written to a temporary
//! file and renamed into place, and a load either yields a complete bundle
//! or fails without partial state.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{IndexBackend, backend_from_bytes};
use crate::config::IndexConfiguration;
use crate::error::{Result, SimdexError};
use crate::identity::IdentityMap;
use crate::metrics::PerformanceMetrics;
use crate::types::VectorRecord;

/// Suffix of the configuration artifact.
pub const CONFIG_SUFFIX: &str = ".config.json";
/// Suffix of the serialized backend artifact.
pub const BACKEND_SUFFIX: &str = ".backend.bin";
/// Suffix of the identifier bookkeeping artifact.
pub const IDENTITY_SUFFIX: &str = ".identity.bin";
/// Suffix of the performance counters artifact.
pub const METRICS_SUFFIX: &str = ".metrics.json";

const ENVELOPE_VERSION: u32 = 1;

/// Checksummed wrapper around a binary artifact payload.
#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    version: u32,
    checksum: u32,
    payload: Vec<u8>,
}

impl ArtifactEnvelope {
    fn seal(payload: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            checksum: crc32fast::hash(&payload),
            payload,
        }
    }

    fn open(bytes: &[u8], path: &Path) -> Result<Vec<u8>> {
        let envelope: ArtifactEnvelope = bincode::deserialize(bytes).map_err(|e| {
            SimdexError::persistence(format!("{}: malformed artifact: {e}", path.display()))
        })?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(SimdexError::persistence(format!(
                "{}: unsupported artifact version {}",
                path.display(),
                envelope.version
            )));
        }
        let checksum = crc32fast::hash(&envelope.payload);
        if checksum != envelope.checksum {
            return Err(SimdexError::persistence(format!(
                "{}: checksum mismatch (stored {:08x}, computed {:08x})",
                path.display(),
                envelope.checksum,
                checksum
            )));
        }
        Ok(envelope.payload)
    }
}

/// Identifier bookkeeping and per-vector records, persisted together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityArtifact {
    pub identity: IdentityMap,
    pub records: AHashMap<String, VectorRecord>,
}

/// Everything a loaded bundle contains.
pub struct BundleState {
    pub config: IndexConfiguration,
    pub backend: Box<dyn IndexBackend>,
    pub identity: IdentityMap,
    pub records: AHashMap<String, VectorRecord>,
    pub metrics: PerformanceMetrics,
}

/// Full path of one artifact under a bundle prefix.
pub fn artifact_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    prefix.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        SimdexError::persistence(format!("{}: cannot read artifact: {e}", path.display()))
    })
}

/// Write all four artifacts under `prefix`.
pub fn save_bundle(
    prefix: &Path,
    config: &IndexConfiguration,
    backend: &dyn IndexBackend,
    identity: &IdentityMap,
    records: &AHashMap<String, VectorRecord>,
    metrics: &PerformanceMetrics,
) -> Result<()> {
    let config_json = serde_json::to_vec_pretty(config)?;
    write_atomic(&artifact_path(prefix, CONFIG_SUFFIX), &config_json)?;

    let backend_envelope = ArtifactEnvelope::seal(backend.to_bytes()?);
    write_atomic(
        &artifact_path(prefix, BACKEND_SUFFIX),
        &bincode::serialize(&backend_envelope)?,
    )?;

    let identity_artifact = IdentityArtifact {
        identity: identity.clone(),
        records: records.clone(),
    };
    let identity_envelope = ArtifactEnvelope::seal(bincode::serialize(&identity_artifact)?);
    write_atomic(
        &artifact_path(prefix, IDENTITY_SUFFIX),
        &bincode::serialize(&identity_envelope)?,
    )?;

    let metrics_json = serde_json::to_vec_pretty(metrics)?;
    write_atomic(&artifact_path(prefix, METRICS_SUFFIX), &metrics_json)?;

    info!(
        prefix = %prefix.display(),
        vectors = backend.count(),
        "saved index bundle"
    );
    Ok(())
}

/// Load a complete bundle from `prefix`.
///
/// The configuration is read first so the backend bytes can be
/// interpreted; any missing or corrupt artifact fails the whole load.
pub fn load_bundle(prefix: &Path) -> Result<BundleState> {
    let config_path = artifact_path(prefix, CONFIG_SUFFIX);
    let config: IndexConfiguration = serde_json::from_slice(&read_artifact(&config_path)?)
        .map_err(|e| {
            SimdexError::persistence(format!(
                "{}: malformed configuration: {e}",
                config_path.display()
            ))
        })?;
    config.validate()?;

    let backend_path = artifact_path(prefix, BACKEND_SUFFIX);
    let backend_bytes = ArtifactEnvelope::open(&read_artifact(&backend_path)?, &backend_path)?;
    let backend = backend_from_bytes(&config, &backend_bytes)?;

    let identity_path = artifact_path(prefix, IDENTITY_SUFFIX);
    let identity_bytes = ArtifactEnvelope::open(&read_artifact(&identity_path)?, &identity_path)?;
    let identity_artifact: IdentityArtifact =
        bincode::deserialize(&identity_bytes).map_err(|e| {
            SimdexError::persistence(format!(
                "{}: malformed identity artifact: {e}",
                identity_path.display()
            ))
        })?;

    let metrics_path = artifact_path(prefix, METRICS_SUFFIX);
    let metrics: PerformanceMetrics = serde_json::from_slice(&read_artifact(&metrics_path)?)
        .map_err(|e| {
            SimdexError::persistence(format!(
                "{}: malformed metrics artifact: {e}",
                metrics_path.display()
            ))
        })?;

    debug!(
        prefix = %prefix.display(),
        vectors = backend.count(),
        "loaded index bundle"
    );
    Ok(BundleState {
        config,
        backend,
        identity: identity_artifact.identity,
        records: identity_artifact.records,
        metrics,
    })
}

/// Tracks when a timed backup is due.
///
/// There is no background thread; the manager asks after each mutation
/// and writes the backup inline when the interval has elapsed.
#[derive(Debug)]
pub struct PersistenceManager {
    backup_interval: Duration,
    last_backup: Instant,
}

impl PersistenceManager {
    /// An interval of zero disables timed backups.
    pub fn new(backup_interval_secs: u64) -> Self {
        Self {
            backup_interval: Duration::from_secs(backup_interval_secs),
            last_backup: Instant::now(),
        }
    }

    /// Whether the backup interval has elapsed.
    pub fn backup_due(&self) -> bool {
        !self.backup_interval.is_zero() && self.last_backup.elapsed() >= self.backup_interval
    }

    /// Restart the interval after a completed backup.
    pub fn mark_backed_up(&mut self) {
        self.last_backup = Instant::now();
    }

    /// Timestamped prefix for a backup of the bundle at `prefix`.
    pub fn backup_prefix(prefix: &Path) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let mut name = prefix
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".backup-{stamp}"));
        prefix.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::create_backend;
    use crate::config::BackendKind;
    use crate::distance::DistanceMetric;

    fn sample_state(dir: &Path) -> (PathBuf, IndexConfiguration) {
        let prefix = dir.join("idx");
        let config = IndexConfiguration::new(DistanceMetric::Euclidean, BackendKind::Flat, 2);
        (prefix, config)
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (prefix, config) = sample_state(dir.path());
        let mut backend = create_backend(&config).unwrap();
        backend.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let mut identity = IdentityMap::new();
        identity.assign("a").unwrap();
        identity.assign("b").unwrap();
        let records = AHashMap::new();
        let mut metrics = PerformanceMetrics::default();
        metrics.record_add(1.0);

        save_bundle(&prefix, &config, backend.as_ref(), &identity, &records, &metrics).unwrap();
        let loaded = load_bundle(&prefix).unwrap();

        assert_eq!(loaded.config, config);
        assert_eq!(loaded.backend.count(), 2);
        assert_eq!(loaded.backend.reconstruct(0).unwrap(), vec![1.0, 0.0]);
        assert_eq!(loaded.identity.position_of("b"), Some(1));
        assert_eq!(loaded.metrics.total_adds, 1);
    }

    #[test]
    fn test_missing_artifact_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let (prefix, config) = sample_state(dir.path());
        let backend = create_backend(&config).unwrap();
        save_bundle(
            &prefix,
            &config,
            backend.as_ref(),
            &IdentityMap::new(),
            &AHashMap::new(),
            &PerformanceMetrics::default(),
        )
        .unwrap();
        fs::remove_file(artifact_path(&prefix, IDENTITY_SUFFIX)).unwrap();
        assert!(matches!(
            load_bundle(&prefix),
            Err(SimdexError::Persistence(_))
        ));
    }

    #[test]
    fn test_corrupt_backend_artifact_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let (prefix, config) = sample_state(dir.path());
        let mut backend = create_backend(&config).unwrap();
        backend.add(&[vec![1.0, 0.0]]).unwrap();
        save_bundle(
            &prefix,
            &config,
            backend.as_ref(),
            &IdentityMap::new(),
            &AHashMap::new(),
            &PerformanceMetrics::default(),
        )
        .unwrap();

        let backend_path = artifact_path(&prefix, BACKEND_SUFFIX);
        let mut bytes = fs::read(&backend_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&backend_path, &bytes).unwrap();

        assert!(matches!(
            load_bundle(&prefix),
            Err(SimdexError::Persistence(_))
        ));
    }

    #[test]
    fn test_backup_due_respects_interval() {
        let disabled = PersistenceManager::new(0);
        assert!(!disabled.backup_due());
        let long = PersistenceManager::new(3600);
        assert!(!long.backup_due());
    }

    #[test]
    fn test_backup_prefix_keeps_parent() {
        let prefix = PathBuf::from("/data/indexes/skin");
        let backup = PersistenceManager::backup_prefix(&prefix);
        assert_eq!(backup.parent(), prefix.parent());
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("skin.backup-"));
    }
}
