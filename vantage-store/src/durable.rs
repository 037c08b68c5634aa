//! File-backed durable store.
//!
//! Each key is stored as pretty-printed JSON in `<dir>/<key>.json`.

use std::path::{Path, PathBuf};

use serde_json::Value;
use vantage_core::{DurableStore, PersistenceError};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`. Characters outside `[A-Za-z0-9._-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn serde_error(key: &str, err: serde_json::Error) -> PersistenceError {
    PersistenceError::Serde {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self, key: &str, default: Value) -> Result<Value, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(default);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        serde_json::from_str(&contents).map_err(|e| serde_error(key, e))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let contents = serde_json::to_string_pretty(value).map_err(|e| serde_error(key, e))?;
        std::fs::write(&path, contents).map_err(|e| io_error(&path, e))
    }
}
