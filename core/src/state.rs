//! Key-value persistence for prompt state.
//!
//! Values are JSON documents addressed by a small set of well-known keys.
//! `JsonFileStore` keeps one file per key:
//!
//! ```text
//! <data_dir>/
//!   prompts.json           local prompts
//!   categories.json        local categories
//!   cloudPrompts.json      cached remote prompts
//!   cloudCategories.json   categories pulled into the cache
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const LOCAL_PROMPTS_KEY: &str = "prompts";
pub const LOCAL_CATEGORIES_KEY: &str = "categories";
pub const CLOUD_PROMPTS_KEY: &str = "cloudPrompts";
pub const CLOUD_CATEGORIES_KEY: &str = "cloudCategories";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error for key {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Backing store for persisted state.
pub trait StateStore: Send + Sync {
    /// Returns `None` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn save(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Loads `key` as `T`, or `T::default()` when absent.
pub fn load_or_default<T>(store: &dyn StateStore, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match store.load(key)? {
        Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        }),
        None => Ok(T::default()),
    }
}

pub fn save_as<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Json {
        key: key.to_string(),
        source,
    })?;
    store.save(key, value)
}

/// One pretty-printed `<key>.json` file per key under a base directory.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Opens (creating if needed) a store rooted at `base_dir`.
    pub fn open(base_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }

    /// Atomically write `data` to `path` via a `.tmp` sibling.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let value = serde_json::from_str(&content).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn save(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        self.atomic_write(&self.path_for(key), json.as_bytes())
    }
}

/// In-process store, mostly for tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the given entries.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            values: Mutex::new(entries.into_iter().collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map is still structurally valid.
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }
}
