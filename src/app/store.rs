use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::app::error::AppError;

/// Opaque key-value persistence supplied by the embedding application.
pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&mut self, key: &str, value: Value);
    fn remove(&mut self, key: &str);
    fn clear(&mut self);

    /// Makes pending writes durable. In-memory stores have nothing to do.
    fn flush(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key)
            .and_then(|value| value.as_i64())
            .and_then(|value| i32::try_from(value).ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(|value| value.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| default.to_string())
    }

    fn put_int(&mut self, key: &str, value: i32) {
        self.put(key, Value::from(value));
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.put(key, Value::from(value));
    }

    fn put_string(&mut self, key: &str, value: &str) {
        self.put(key, Value::from(value));
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Preferences kept as one flat JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
    dirty: bool,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|err| AppError::io(format!("Failed to read preferences: {err}"), ""))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|err| {
                    AppError::parse(format!("Failed to parse preferences: {err}"), "")
                })?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
        self.dirty = true;
    }

    fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.dirty = true;
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.dirty = true;
    }

    fn flush(&mut self) -> Result<(), AppError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let payload = serde_json::to_string_pretty(&self.values)
            .map_err(|err| AppError::system(format!("Failed to serialize preferences: {err}"), ""))?;
        fs::write(&self.path, payload)
            .map_err(|err| AppError::io(format!("Failed to write preferences: {err}"), ""))?;
        self.dirty = false;
        Ok(())
    }
}
