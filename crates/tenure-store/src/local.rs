//! Local (non-replicated) persisted key-value store.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::write_atomic;

pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-lifetime store (for testing and embedded hosts).
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values().remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
/// Location: `{dir}/{key}` with characters outside `[A-Za-z0-9._-]` replaced by `_`.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(name)
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        write_atomic(&self.path_for(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn LocalStore) {
        assert_eq!(store.get("notice.session").unwrap(), None);
        store.set("notice.session", "{\"a\":1}").unwrap();
        assert_eq!(
            store.get("notice.session").unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        store.remove("notice.session").unwrap();
        assert_eq!(store.get("notice.session").unwrap(), None);
        // Removing an absent key is fine.
        store.remove("notice.session").unwrap();
    }

    #[test]
    fn memory_store_get_set_remove() {
        exercise(&MemoryLocalStore::new());
    }

    #[test]
    fn file_store_get_set_remove() {
        let tmp = tempfile::tempdir().unwrap();
        exercise(&FileLocalStore::new(tmp.path().join("local")));
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileLocalStore::new(tmp.path());
        store.set("../escape/attempt", "x").unwrap();
        assert!(tmp.path().join(".._escape_attempt").exists());
        assert_eq!(store.get("../escape/attempt").unwrap().as_deref(), Some("x"));
    }
}
