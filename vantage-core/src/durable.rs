//! Durable local store contract.
//!
//! A handful of values must survive a process restart. The store seeds the
//! cache at startup; while a session is alive the cache is the read path.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;

/// Key/value store that outlives the process.
pub trait DurableStore: Send + Sync {
    /// Load the value stored under `key`, or `default` if nothing is stored.
    fn load(&self, key: &str, default: Value) -> Result<Value, PersistenceError>;

    /// Store `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &Value) -> Result<(), PersistenceError>;
}

/// Typed helpers over [`DurableStore`].
pub trait DurableStoreExt: DurableStore {
    fn load_typed<T>(&self, key: &str, default: T) -> Result<T, PersistenceError>
    where
        T: Serialize + DeserializeOwned,
    {
        let fallback = serde_json::to_value(&default).map_err(|e| serde_error(key, e))?;
        let value = self.load(key, fallback)?;
        serde_json::from_value(value).map_err(|e| serde_error(key, e))
    }

    fn save_typed<T>(&self, key: &str, value: &T) -> Result<(), PersistenceError>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value).map_err(|e| serde_error(key, e))?;
        self.save(key, &value)
    }
}

impl<S: DurableStore + ?Sized> DurableStoreExt for S {}

fn serde_error(key: &str, err: serde_json::Error) -> PersistenceError {
    PersistenceError::Serde {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
