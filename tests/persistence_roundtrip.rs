//! Save/load behavior of complete index bundles.

use std::collections::HashMap;
use std::fs;

use simdex::persist::{self, BACKEND_SUFFIX, CONFIG_SUFFIX, IDENTITY_SUFFIX, METRICS_SUFFIX};
use simdex::{
    BackendKind, DistanceMetric, HnswParams, IndexConfiguration, IndexManager, SimdexError,
};

const DIMENSION: usize = 16;

fn embedding(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMENSION];
    v[axis % DIMENSION] = 1.0;
    v[(axis + 3) % DIMENSION] = 0.2;
    v
}

fn populated(backend: BackendKind) -> IndexManager {
    let config = IndexConfiguration::new(DistanceMetric::InnerProduct, backend, DIMENSION)
        .with_optimize_threshold(0);
    let manager = IndexManager::new(config).unwrap();
    for axis in 0..12 {
        let mut metadata = HashMap::new();
        metadata.insert("axis".to_string(), axis.to_string());
        manager
            .add(&format!("v{axis}"), &embedding(axis), metadata)
            .unwrap();
    }
    manager.remove("v5").unwrap();
    manager
}

#[test]
fn saved_and_loaded_indexes_answer_identically() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("skin");
    let manager = populated(BackendKind::Flat);
    manager.save(&prefix).unwrap();

    let loaded = IndexManager::load(&prefix).unwrap();
    assert_eq!(loaded.len(), manager.len());
    assert!(loaded.validate().is_consistent());

    for axis in [0, 3, 7, 11] {
        let query = embedding(axis);
        assert_eq!(
            loaded.search(&query, 4).unwrap(),
            manager.search(&query, 4).unwrap()
        );
    }
    // Tombstones survive the round trip.
    assert!(!loaded.contains("v5"));
    assert_eq!(loaded.stats().tombstone_count, 1);
}

#[test]
fn graph_backend_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("graph");
    let manager = populated(BackendKind::Hnsw(HnswParams::default()));
    manager.save(&prefix).unwrap();

    let loaded = IndexManager::load(&prefix).unwrap();
    let query = embedding(2);
    assert_eq!(
        loaded.search(&query, 3).unwrap(),
        manager.search(&query, 3).unwrap()
    );
}

#[test]
fn records_and_metrics_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("idx");
    let manager = populated(BackendKind::Flat);
    manager.search(&embedding(0), 2).unwrap();
    manager.save(&prefix).unwrap();
    let before = manager.stats();

    let loaded = IndexManager::load(&prefix).unwrap();
    let after = loaded.stats();
    assert_eq!(after.metrics.total_adds, before.metrics.total_adds);
    assert_eq!(after.metrics.total_searches, before.metrics.total_searches);

    let record = loaded.record("v3").unwrap();
    assert_eq!(record.metadata.get("axis").unwrap(), "3");
    assert_eq!(record.position, 3);
}

#[test]
fn loaded_index_accepts_further_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("idx");
    populated(BackendKind::Flat).save(&prefix).unwrap();

    let loaded = IndexManager::load(&prefix).unwrap();
    loaded.add("fresh", &embedding(13), HashMap::new()).unwrap();
    assert!(loaded.validate().is_consistent());
    assert!(matches!(
        loaded.add("v0", &embedding(0), HashMap::new()).unwrap_err(),
        SimdexError::DuplicateIdentifier(_)
    ));
}

#[test]
fn each_missing_artifact_fails_the_load() {
    for suffix in [CONFIG_SUFFIX, BACKEND_SUFFIX, IDENTITY_SUFFIX, METRICS_SUFFIX] {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("idx");
        populated(BackendKind::Flat).save(&prefix).unwrap();
        fs::remove_file(persist::artifact_path(&prefix, suffix)).unwrap();
        assert!(
            matches!(IndexManager::load(&prefix), Err(SimdexError::Persistence(_))),
            "load should fail with {suffix} missing"
        );
    }
}

#[test]
fn corrupt_identity_artifact_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("idx");
    populated(BackendKind::Flat).save(&prefix).unwrap();

    let path = persist::artifact_path(&prefix, IDENTITY_SUFFIX);
    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x55;
    fs::write(&path, &bytes).unwrap();

    match IndexManager::load(&prefix) {
        Err(SimdexError::Persistence(message)) => {
            assert!(message.contains("checksum") || message.contains("malformed"));
        }
        other => panic!("expected persistence error, got {other:?}"),
    }
}

#[test]
fn truncated_backend_artifact_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("idx");
    populated(BackendKind::Flat).save(&prefix).unwrap();

    let path = persist::artifact_path(&prefix, BACKEND_SUFFIX);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(
        IndexManager::load(&prefix),
        Err(SimdexError::Persistence(_))
    ));
}

#[test]
fn save_overwrites_previous_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("idx");
    let manager = populated(BackendKind::Flat);
    manager.save(&prefix).unwrap();
    manager.add("late", &embedding(14), HashMap::new()).unwrap();
    manager.save(&prefix).unwrap();

    let loaded = IndexManager::load(&prefix).unwrap();
    assert!(loaded.contains("late"));
    assert_eq!(loaded.len(), manager.len());
}
