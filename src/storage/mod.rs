//! Persistent key/value storage
//!
//! Each setter is independently durable and immediately readable after it
//! returns. Implementations use interior mutability so the link and broker
//! managers can share one store handle.

pub mod file;

pub use file::FileStore;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, warn};

/// Store keys, all within the device's network namespace
pub mod keys {
    pub const LINK_ENABLED: &str = "link_enabled";
    pub const LINK_IDENTITY: &str = "link_identity";
    pub const LINK_SECRET: &str = "link_secret";
    pub const BROKER_ENABLED: &str = "broker_enabled";
    pub const BROKER_HOST: &str = "broker_host";
    pub const BROKER_PORT: &str = "broker_port";
    pub const BROKER_USERNAME: &str = "broker_username";
    pub const BROKER_PASSWORD: &str = "broker_password";
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// A single stored value
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

/// Durable key/value storage
pub trait KeyValueStore {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn get_integer(&self, key: &str) -> Option<i64>;
    fn set_integer(&self, key: &str, value: i64) -> Result<(), StoreError>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;

    /// Read a key whatever its type
    fn get_value(&self, key: &str) -> Option<StoredValue> {
        self.get_string(key)
            .map(StoredValue::String)
            .or_else(|| self.get_integer(key).map(StoredValue::Integer))
            .or_else(|| self.get_bool(key).map(StoredValue::Bool))
    }

    /// Write a value, or remove the key for `None`
    fn put_value(&self, key: &str, value: Option<&StoredValue>) -> Result<(), StoreError> {
        match value {
            Some(StoredValue::String(value)) => self.set_string(key, value),
            Some(StoredValue::Integer(value)) => self.set_integer(key, *value),
            Some(StoredValue::Bool(value)) => self.set_bool(key, *value),
            None => self.remove(key),
        }
    }
}

/// Apply related writes as a group
///
/// If one write fails, the keys already written get their previous values
/// back before the error is returned.
pub fn write_group(
    store: &dyn KeyValueStore,
    writes: &[(&str, Option<StoredValue>)],
) -> Result<(), StoreError> {
    let previous: Vec<Option<StoredValue>> =
        writes.iter().map(|(key, _)| store.get_value(key)).collect();

    for (done, (key, value)) in writes.iter().enumerate() {
        if let Err(e) = store.put_value(key, value.as_ref()) {
            warn!("Store write to {} failed, restoring {} earlier keys", key, done);
            for ((key, _), old) in writes[..done].iter().zip(&previous) {
                if let Err(restore) = store.put_value(key, old.as_ref()) {
                    error!("Failed to restore {}: {}", key, restore);
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Shared store handle passed to the managers at construction
pub type SharedStore = Arc<dyn KeyValueStore + Send + Sync>;

/// Volatile store, useful for tests and for running without a filesystem
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            StoredValue::String(value) => Some(value),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, StoredValue::String(value.to_string()))
    }

    fn get_integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            StoredValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    fn set_integer(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put(key, StoredValue::Integer(value))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            StoredValue::Bool(value) => Some(value),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, StoredValue::Bool(value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.clear();
        Ok(())
    }
}
