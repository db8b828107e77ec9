// tests/storage_test.rs — Integration test: model persistence across restarts

use std::sync::Arc;

use habitual::engine::Engine;
use habitual::infra::config::{MiningConfig, StorageBackend, StorageConfig};
use habitual::infra::errors::EngineError;
use habitual::mining::StateRecord;
use habitual::storage::{open_store, JsonFileStore, ModelStore, SqliteStore};

fn records() -> Vec<StateRecord> {
    let mut out = Vec::new();
    for day in 1..=7 {
        out.push(StateRecord::new(
            "switch.kettle",
            "off",
            &format!("2024-05-{day:02}T06:00:00Z"),
        ));
        out.push(StateRecord::new(
            "switch.kettle",
            "on",
            &format!("2024-05-{day:02}T06:45:00Z"),
        ));
    }
    out
}

fn assert_same_model(a: &Engine, b: &Engine) {
    let (a, b) = (a.snapshot().unwrap(), b.snapshot().unwrap());
    assert_eq!(a.metadata, b.metadata);
    assert_eq!(a.statistics, b.statistics);
    assert_eq!(a.sequences, b.sequences);
}

#[test]
fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        backend: StorageBackend::Sqlite,
        path: Some(dir.path().join("habitual.db").display().to_string()),
    };

    let engine = Engine::new().with_store(open_store(&config).unwrap());
    let summary = engine.train(&records(), &MiningConfig::default()).unwrap();
    assert!(summary.persisted);

    let restarted = Engine::new().with_store(open_store(&config).unwrap());
    assert!(restarted.restore().unwrap());
    assert_same_model(&engine, &restarted);

    let at = chrono::DateTime::parse_from_rfc3339("2024-05-13T06:50:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    assert_eq!(
        engine.predict(Some(at), &MiningConfig::default()).unwrap(),
        restarted.predict(Some(at), &MiningConfig::default()).unwrap()
    );
}

#[test]
fn test_json_export_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export/model.json");

    let engine = Engine::new();
    engine.train(&records(), &MiningConfig::default()).unwrap();
    engine.save(&path).unwrap();

    let imported = Engine::new();
    imported.load(&path).unwrap();
    assert_same_model(&engine, &imported);
}

#[test]
fn test_corrupt_state_leaves_engine_untrained() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, r#"{"metadata": {"format_version": 1}}"#).unwrap();

    let store: Arc<dyn ModelStore> = Arc::new(JsonFileStore::new(&path));
    let engine = Engine::new().with_store(store);
    let err = engine.restore().unwrap_err();
    assert!(matches!(err, EngineError::Serialization(_)));
    assert!(!engine.is_trained());

    let err = engine.load(&path).unwrap_err();
    assert!(matches!(err, EngineError::Serialization(_)));
    assert!(!engine.is_trained());
}

#[test]
fn test_failed_load_keeps_current_model() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "not json at all").unwrap();

    let engine = Engine::new();
    engine.train(&records(), &MiningConfig::default()).unwrap();
    let before = engine.snapshot().unwrap();

    assert!(engine.load(&bad).is_err());
    assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
}

#[test]
fn test_store_failure_does_not_fail_training() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the database file should be
    let blocked = dir.path().join("db");
    std::fs::create_dir_all(&blocked).unwrap();

    let engine = Engine::new().with_store(Arc::new(SqliteStore::new(&blocked)));
    let summary = engine.train(&records(), &MiningConfig::default()).unwrap();
    assert!(!summary.persisted);
    assert!(engine.is_trained());
}
