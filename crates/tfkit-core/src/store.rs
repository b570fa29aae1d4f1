//! Runtime property store
//!
//! The host owns persistence of per-instance runtime properties; tfkit only
//! needs get/set/remove plus an explicit `update()` flush. Writes are
//! last-writer-wins.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Runtime property keys recognized by tfkit
pub mod keys {
    pub const RESOURCE_CONFIG: &str = "resource_config";
    pub const TERRAFORM_CONFIG: &str = "terraform_config";
    pub const TERRAFORM_SOURCE: &str = "terraform_source";
    pub const LAST_SOURCE_LOCATION: &str = "last_source_location";
    pub const EXECUTABLE_PATH: &str = "executable_path";
    pub const PLUGINS_DIR: &str = "plugins_dir";
    pub const STORAGE_PATH: &str = "storage_path";
    pub const RESOURCES: &str = "resources";
    /// Legacy alias of `resources`
    pub const STATE: &str = "state";
    pub const DRIFTS: &str = "drifts";
    pub const IS_DRIFTED: &str = "is_drifted";
}

/// Key-value store scoped to one node instance
pub trait PropertyStore: Send + Sync {
    /// Get a property value
    fn get(&self, key: &str) -> Option<Value>;

    /// Set a property value
    fn set(&self, key: &str, value: Value);

    /// Remove a property, returning the previous value
    fn remove(&self, key: &str) -> Option<Value>;

    /// Flush pending writes to the backing storage
    fn update(&self) -> Result<()>;

    /// Snapshot of every property
    fn snapshot(&self) -> Map<String, Value>;
}

/// Typed helpers available on every store
pub trait PropertyStoreExt {
    /// Deserialize a property; absent and `null` both read as `None`
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

    /// Serialize and set a property
    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;

    /// Read a string property, treating empty strings as absent
    fn get_string(&self, key: &str) -> Option<String>;
}

impl<S: PropertyStore + ?Sized> PropertyStoreExt for S {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

/// In-memory store; `update()` is a no-op
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `values`
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

impl PropertyStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    fn update(&self) -> Result<()> {
        Ok(())
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Store persisted as a JSON object on disk
///
/// Reads and writes go to memory; `update()` rewrites the file through a
/// temporary file in the same directory followed by a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(Error::invalid_config(format!(
                            "Runtime property file {} does not contain a JSON object",
                            path.display()
                        )))
                    }
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            inner: MemoryStore::with_values(values),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PropertyStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Option<Value> {
        self.inner.remove(key)
    }

    fn update(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir).map_err(|e| Error::from_io(&dir, e))?;

        let content = serde_json::to_vec_pretty(&Value::Object(self.inner.snapshot()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::from_io(&dir, e))?;
        tmp.write_all(&content)?;
        tmp.persist(&self.path)
            .map_err(|e| Error::from_io(&self.path, e.error))?;
        Ok(())
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.inner.snapshot()
    }
}
