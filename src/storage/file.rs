//! JSON-file backed store
//!
//! The whole map is rewritten through a temporary file and renamed into place
//! on every mutation, so each setter is durable on return.

use super::{KeyValueStore, StoreError, StoredValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, StoredValue>>,
}

impl FileStore {
    /// Open the store at `path`, creating an empty one if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn mutate<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, StoredValue>),
    {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = values.clone();
        apply(&mut next);
        self.flush(&next)?;
        *values = next;
        Ok(())
    }

    fn flush(&self, values: &BTreeMap<String, StoredValue>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!("Failed to move store into place at {}: {}", self.path.display(), e);
            return Err(e.into());
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            StoredValue::String(value) => Some(value),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(|values| {
            values.insert(key.to_string(), StoredValue::String(value.to_string()));
        })
    }

    fn get_integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            StoredValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    fn set_integer(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.mutate(|values| {
            values.insert(key.to_string(), StoredValue::Integer(value));
        })
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            StoredValue::Bool(value) => Some(value),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.mutate(|values| {
            values.insert(key.to_string(), StoredValue::Bool(value));
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|values| {
            values.remove(key);
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.mutate(BTreeMap::clear)
    }
}
