use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use super::{ChangeFeed, KeyValueStore, StoreChange, StoreError};

/// JSON-file store shared by every process using the same path. Each
/// operation reads the file fresh; mutations rewrite the whole map via a temp
/// file and rename, so a crash leaves either the old or new file.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
    feed: ChangeFeed,
}

impl FileStore {
    /// Open `path`, creating parent directories. The file itself is created
    /// on first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
            feed: ChangeFeed::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store. An unreadable one is an error and
    /// is never overwritten.
    async fn load(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                log::error!("Unreadable store {}: {}", self.path.display(), e);
                StoreError::Serde(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await?;
        self.feed.emit(key, false);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let removed: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| entries.remove(*k).is_some())
            .collect();
        if removed.is_empty() {
            return Ok(());
        }
        self.flush(&entries).await?;
        for key in removed {
            self.feed.emit(key, true);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}
