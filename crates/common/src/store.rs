//! Key-value persistence backed by one JSON file per key.
//!
//! The core treats storage as a collaborator that may be empty, absent, or
//! corrupted: reads fall back to the type's default instead of failing, so a
//! damaged state file can never take the app down.

use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read the value under `key`, or the type's default when the file is
    /// missing, unreadable, or holds malformed JSON.
    pub fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.read_opt(key).unwrap_or_default()
    }

    /// Read the value under `key` if it exists and parses.
    pub fn read_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring malformed state in {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write `value` under `key`, replacing any previous content.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(value)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.path_for(key))
            .map_err(|e| Error::Storage(format!("failed to open {key}: {e}")))?;
        file.write_all(data.as_bytes())
            .map_err(|e| Error::Storage(format!("failed to write {key}: {e}")))?;
        file.flush()
            .map_err(|e| Error::Storage(format!("failed to flush {key}: {e}")))?;
        Ok(())
    }

    /// Remove the value under `key`. Missing files are not an error.
    pub fn remove(&self, key: &str) -> Result<(), Error> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("failed to remove {key}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_store() -> Store {
        let dir = std::env::temp_dir().join(format!(
            "reachmap-store-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        Store::open(dir).expect("store should open")
    }

    #[test]
    fn test_missing_key_falls_back_to_default() {
        let store = temp_store();
        let map: HashMap<String, u32> = store.read("absent");
        assert!(map.is_empty());
    }

    #[test]
    fn test_malformed_json_falls_back_to_default() {
        let store = temp_store();
        std::fs::write(store.path_for("broken"), "{not json at all").expect("write raw");
        let map: HashMap<String, u32> = store.read("broken");
        assert!(map.is_empty());
        assert!(store.read_opt::<HashMap<String, u32>>("broken").is_none());
    }

    #[test]
    fn test_roundtrip_and_overwrite() {
        let store = temp_store();
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u32);
        store.write("counts", &map).expect("write should succeed");

        map.insert("b".to_string(), 2);
        store.write("counts", &map).expect("overwrite should succeed");

        let back: HashMap<String, u32> = store.read("counts");
        assert_eq!(back.len(), 2);
        assert_eq!(back.get("b"), Some(&2));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = temp_store();
        store.write("key", &42u32).expect("write should succeed");
        store.remove("key").expect("remove should succeed");
        store.remove("key").expect("second remove should succeed");
        assert!(store.read_opt::<u32>("key").is_none());
    }
}
