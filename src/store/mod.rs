use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::session::Address;

pub const DEFAULT_NAMESPACE: &str = "nft-tourism-claimed";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("bucket encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key-value storage for per-address record sets.
pub trait PersistenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub fn storage_key(namespace: &str, address: &Address) -> String {
    format!("{namespace}-{address}")
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls served so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Seeds a raw value without counting it as a write.
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl PersistenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}

/// One JSON file per key inside `root`.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl PersistenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        // readers never see a half-written bucket
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_joins_namespace_and_address() {
        let key = storage_key(DEFAULT_NAMESPACE, &Address::new("0xAbC"));
        assert_eq!(key, "nft-tourism-claimed-0xAbC");
    }

    #[test]
    fn memory_store_counts_writes_but_not_seeds() {
        let mut store = MemoryStore::new();
        store.insert_raw("a", "[]");
        assert_eq!(store.writes(), 0);
        store.set("a", "[1]").unwrap();
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn file_store_reads_back_and_treats_missing_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("buckets"));
        assert_eq!(store.get("nft-tourism-claimed-0x1").unwrap(), None);
        store.set("nft-tourism-claimed-0x1", "[]").unwrap();
        assert_eq!(
            store.get("nft-tourism-claimed-0x1").unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        store.set("ns-../../etc", "x").unwrap();
        assert!(dir.path().join("ns-.._.._etc.json").exists());
        assert_eq!(store.get("ns-../../etc").unwrap().as_deref(), Some("x"));
    }
}
