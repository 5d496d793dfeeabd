use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single stored preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
    StringSet(BTreeSet<String>),
}

/// Flat key-value storage the configuration is read from.
///
/// Reads are synchronous. Writes are fire-and-forget: implementations apply
/// them in memory immediately and persist on a best-effort basis, so a
/// failed write never reaches the caller.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<PrefValue>;
    fn set(&self, key: &str, value: PrefValue);
    fn remove(&self, key: &str);

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(PrefValue::Bool(v)) => v,
            _ => default,
        }
    }

    fn get_int(&self, key: &str, default: i32) -> i32 {
        match self.get(key) {
            Some(PrefValue::Int(v)) => v,
            _ => default,
        }
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.get(key) {
            Some(PrefValue::Float(v)) => v,
            _ => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(PrefValue::Str(v)) => v,
            _ => default.to_string(),
        }
    }

    fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        match self.get(key) {
            Some(PrefValue::StringSet(v)) => v,
            _ => BTreeSet::new(),
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set(key, PrefValue::Bool(value));
    }

    fn set_int(&self, key: &str, value: i32) {
        self.set(key, PrefValue::Int(value));
    }

    fn set_float(&self, key: &str, value: f32) {
        self.set(key, PrefValue::Float(value));
    }

    fn set_string(&self, key: &str, value: &str) {
        self.set(key, PrefValue::Str(value.to_string()));
    }

    fn set_string_set(&self, key: &str, value: BTreeSet<String>) {
        self.set(key, PrefValue::StringSet(value));
    }
}

/// Volatile store, used by tests and as a scratch backend.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, PrefValue>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<PrefValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: PrefValue) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

/// JSON-file backed store. Every write rewrites the file atomically.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: RwLock<BTreeMap<String, PrefValue>>,
}

impl FilePreferences {
    /// Open the store at `path`; a missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let data = fs::read(&path)
                .with_context(|| format!("read preferences {}", path.display()))?;
            if data.iter().all(|b| b.is_ascii_whitespace()) {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&data)
                    .with_context(|| format!("parse preferences {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = values.len(), "preferences loaded");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current contents, reporting failures.
    pub fn flush(&self) -> Result<()> {
        let values = self.values.read();
        write_atomic(&self.path, &values)
    }

    fn apply(&self, values: &BTreeMap<String, PrefValue>) {
        if let Err(err) = write_atomic(&self.path, values) {
            warn!(path = %self.path.display(), error = %err, "failed to persist preferences");
        }
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<PrefValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: PrefValue) {
        let mut values = self.values.write();
        values.insert(key.to_string(), value);
        self.apply(&values);
    }

    fn remove(&self, key: &str) {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.apply(&values);
        }
    }
}

fn write_atomic(path: &Path, values: &BTreeMap<String, PrefValue>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let data = serde_json::to_vec_pretty(values)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&data)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| anyhow!("persist preferences {}: {}", path.display(), e.error))?;
    Ok(())
}
