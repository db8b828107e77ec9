// src/storage/sqlite.rs — SQLite model store with payload checksums

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{schema, ModelStore};
use crate::engine::Model;
use crate::infra::errors::EngineError;

/// How many past models are kept after each save.
pub const DEFAULT_KEEP: usize = 3;

pub struct SqliteStore {
    path: PathBuf,
    keep: usize,
}

pub fn checksum(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: DEFAULT_KEEP,
        }
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connections are opened per call and dropped with the caller's scope.
    fn open(&self) -> Result<Connection, EngineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(conn)
    }

    pub fn model_count(&self) -> Result<usize, EngineError> {
        let conn = self.open()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM models", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl ModelStore for SqliteStore {
    fn save(&self, model: &Model) -> Result<(), EngineError> {
        let payload = model.to_json()?;
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.open()?;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO models (id, format_version, trained_at, checksum, payload, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%d %H:%M:%f', 'now'))",
            params![
                id,
                model.metadata.format_version,
                model.metadata.trained_at.to_rfc3339(),
                checksum(&payload),
                payload,
            ],
        )?;
        let pruned = tx.execute(
            "DELETE FROM models WHERE id NOT IN (
                SELECT id FROM models ORDER BY saved_at DESC, rowid DESC LIMIT ?1
             )",
            params![self.keep as i64],
        )?;
        tx.commit()?;

        tracing::debug!(model_id = %id, pruned, "Stored model");
        Ok(())
    }

    fn load(&self) -> Result<Option<Model>, EngineError> {
        let conn = self.open()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT id, checksum, payload FROM models
                 ORDER BY saved_at DESC, rowid DESC LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        let Some((id, expected, payload)) = row else {
            return Ok(None);
        };
        if checksum(&payload) != expected {
            return Err(EngineError::Serialization(format!(
                "checksum mismatch for stored model {id}"
            )));
        }
        Model::from_json(&payload).map(Some)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::MiningConfig;
    use crate::mining::StateRecord;
    use chrono::{TimeZone, Utc};

    fn model(day: u32) -> Model {
        let records = vec![
            StateRecord::new("light.desk", "off", "2024-01-01T07:00:00Z"),
            StateRecord::new("light.desk", "on", "2024-01-01T07:30:00Z"),
        ];
        let trained_at = Utc.with_ymd_and_hms(2024, 2, day, 3, 0, 0).unwrap();
        Model::build(&records, &MiningConfig::default(), trained_at, &|_| {}).unwrap()
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_empty_database_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("m.db"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_latest_model_wins_and_old_rows_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("m.db")).with_keep(2);
        for day in 1..=4 {
            store.save(&model(day)).unwrap();
        }
        assert_eq!(store.model_count().unwrap(), 2);
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, model(4));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("m.db"));
        store.save(&model(1)).unwrap();

        let conn = Connection::open(store.path()).unwrap();
        conn.execute("UPDATE models SET payload = payload || ' '", [])
            .unwrap();
        drop(conn);

        let err = store.load().unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
