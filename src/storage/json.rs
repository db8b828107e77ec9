// src/storage/json.rs — Single-file JSON model store

use std::fs;
use std::path::{Path, PathBuf};

use super::ModelStore;
use crate::engine::Model;
use crate::infra::errors::EngineError;

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `contents` next to `path` and rename it into place, so readers
/// never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl ModelStore for JsonFileStore {
    fn save(&self, model: &Model) -> Result<(), EngineError> {
        write_atomic(&self.path, &model.to_json()?)
    }

    fn load(&self) -> Result<Option<Model>, EngineError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Model::from_json(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
