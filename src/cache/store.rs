use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{InventoryError, InventoryResult};

/// String key-value persistence holding the serialized cache entry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> InventoryResult<Option<String>>;
    async fn put(&self, key: &str, value: String) -> InventoryResult<()>;
    async fn remove(&self, key: &str) -> InventoryResult<()>;
}

/// All keys in one JSON object on disk, replaced atomically via a sibling temp file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> InventoryResult<BTreeMap<String, String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(InventoryError::CacheStore(format!(
                    "read {} failed: {e}",
                    self.path.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            InventoryError::CacheStore(format!("{} is corrupt: {e}", self.path.display()))
        })
    }

    async fn write_all(&self, map: &BTreeMap<String, String>) -> InventoryResult<()> {
        let store_err = |e: std::io::Error| {
            InventoryError::CacheStore(format!("write {} failed: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(store_err)?;
        }
        let body = serde_json::to_string(map)
            .map_err(|e| InventoryError::CacheStore(format!("serialize failed: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await.map_err(store_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(store_err)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> InventoryResult<Option<String>> {
        Ok(self.read_all().await?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> InventoryResult<()> {
        let _guard = self.write_lock.lock().await;
        // Corrupt contents are discarded on write.
        let mut map = self.read_all().await.unwrap_or_default();
        map.insert(key.to_string(), value);
        self.write_all(&map).await
    }

    async fn remove(&self, key: &str) -> InventoryResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await.unwrap_or_default();
        if map.remove(key).is_some() {
            self.write_all(&map).await?;
        }
        Ok(())
    }
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> InventoryResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> InventoryResult<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> InventoryResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("stone-inventory-store-{}-{name}", std::process::id()))
            .join("cache.json")
    }

    #[tokio::test]
    async fn file_store_round_trips_and_removes() {
        let path = scratch_path("roundtrip");
        let _ = tokio::fs::remove_file(&path).await;
        let store = FileStore::new(&path);

        assert_eq!(store.get("inventoryData").await.unwrap(), None);
        store.put("inventoryData", "{\"a\":1}".into()).await.unwrap();
        store.put("other", "x".into()).await.unwrap();
        assert_eq!(
            store.get("inventoryData").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        store.remove("inventoryData").await.unwrap();
        assert_eq!(store.get("inventoryData").await.unwrap(), None);
        assert_eq!(store.get("other").await.unwrap().as_deref(), Some("x"));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_store_failure_but_accepts_writes() {
        let path = scratch_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let store = FileStore::new(&path);

        let err = store.get("inventoryData").await.unwrap_err();
        assert_eq!(err.kind(), "cache_store");

        store.put("inventoryData", "fresh".into()).await.unwrap();
        assert_eq!(
            store.get("inventoryData").await.unwrap().as_deref(),
            Some("fresh")
        );
        let _ = tokio::fs::remove_file(&path).await;
    }
}
