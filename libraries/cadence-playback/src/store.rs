//! Key-value storage for the persisted snapshot
//!
//! The engine only needs a small typed key-value surface with an explicit
//! commit. Two implementations ship with the crate: [`MemoryStore`] for tests
//! and embedding, and [`JsonFileStore`] which writes a JSON document with an
//! atomic rename.

use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Typed key-value store with explicit commit
pub trait KeyValueStore: Send {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_i32(&self, key: &str) -> Option<i32>;
    fn get_i64(&self, key: &str) -> Option<i64>;

    fn put_string(&mut self, key: &str, value: String);
    fn put_i32(&mut self, key: &str, value: i32);
    fn put_i64(&mut self, key: &str, value: i64);

    /// Make pending writes durable
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// A stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreValue {
    String(String),
    Int(i32),
    Long(i64),
}

impl StoreValue {
    fn as_string(&self) -> Option<String> {
        match self {
            StoreValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_i32(&self) -> Option<i32> {
        match self {
            StoreValue::Int(v) => Some(*v),
            StoreValue::Long(v) => i32::try_from(*v).ok(),
            StoreValue::String(_) => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            StoreValue::Int(v) => Some(i64::from(*v)),
            StoreValue::Long(v) => Some(*v),
            StoreValue::String(_) => None,
        }
    }
}

/// In-memory store
///
/// Clones share the same contents, so a test can keep a handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, StoreValue>>>,
    commits: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of all stored values
    pub fn values(&self) -> BTreeMap<String, StoreValue> {
        self.values.lock().clone()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).and_then(StoreValue::as_string)
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.values.lock().get(key).and_then(StoreValue::as_i32)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.lock().get(key).and_then(StoreValue::as_i64)
    }

    fn put_string(&mut self, key: &str, value: String) {
        self.values
            .lock()
            .insert(key.to_string(), StoreValue::String(value));
    }

    fn put_i32(&mut self, key: &str, value: i32) {
        self.values.lock().insert(key.to_string(), StoreValue::Int(value));
    }

    fn put_i64(&mut self, key: &str, value: i64) {
        self.values.lock().insert(key.to_string(), StoreValue::Long(value));
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store backed by a JSON file
///
/// Writes are buffered until [`commit`](KeyValueStore::commit), which writes
/// a sibling temp file and renames it over the target.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, StoreValue>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file yields an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };

        debug!("Opened store at {:?} ({} keys)", path, values.len());
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &BTreeMap<String, StoreValue> {
        &self.values
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(StoreValue::as_string)
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.values.get(key).and_then(StoreValue::as_i32)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(StoreValue::as_i64)
    }

    fn put_string(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), StoreValue::String(value));
    }

    fn put_i32(&mut self, key: &str, value: i32) {
        self.values.insert(key.to_string(), StoreValue::Int(value));
    }

    fn put_i64(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), StoreValue::Long(value));
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let contents = serde_json::to_string_pretty(&self.values)?;
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
