//! Local key-value storage for the account documents.
//!
//! Each key holds one serialized JSON document. Updates are plain
//! read-modify-write with no locking; only one process is expected to touch a
//! data directory at a time.

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const PENDING_USERS_KEY: &str = "pendingUsers";
pub const NOTIFICATIONS_KEY: &str = "adminNotifications";
pub const SESSION_KEY: &str = "user";

/// Minimal string-keyed storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a data directory
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        std::fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, used by tests and `--ephemeral` runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Read and decode a document, falling back to the type's default when absent
pub fn read_json<T, S>(store: &S, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
    S: KeyValueStore + ?Sized,
{
    match store.get(key)? {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str(&raw).with_context(|| format!("decoding stored '{}'", key))
        }
        _ => Ok(T::default()),
    }
}

pub fn write_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Seed the registry and notification documents if they are missing
pub fn initialize<S: KeyValueStore + ?Sized>(store: &S) -> Result<()> {
    for key in [PENDING_USERS_KEY, NOTIFICATIONS_KEY] {
        if store.get(key)?.is_none() {
            store.set(key, "[]")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(&dir.path().join("data")).unwrap();

        assert_eq!(store.get("user").unwrap(), None);
        store.set("user", "{\"a\":1}").unwrap();
        assert_eq!(store.get("user").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(dir.path().join("data").join("user.json").exists());

        store.remove("user").unwrap();
        assert_eq!(store.get("user").unwrap(), None);
        // removing twice is fine
        store.remove("user").unwrap();
    }

    #[test]
    fn test_initialize_does_not_overwrite() {
        let store = MemoryStore::new();
        store.set(PENDING_USERS_KEY, "[1]").unwrap();
        initialize(&store).unwrap();
        assert_eq!(store.get(PENDING_USERS_KEY).unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.get(NOTIFICATIONS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_read_json_missing_is_default() {
        let store = MemoryStore::new();
        let v: Vec<u32> = read_json(&store, "nothing").unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn test_read_json_corrupt_is_error() {
        let store = MemoryStore::new();
        store.set("broken", "not json").unwrap();
        let result: Result<Vec<u32>> = read_json(&store, "broken");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("broken"));
    }
}
