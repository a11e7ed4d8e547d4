//! Key-value persistence with typed accessors for credentials, the sync
//! cursor and the pending-action list.

pub mod file;
pub mod memory;
pub mod state;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use state::StateStore;

pub const KEY_CREDENTIALS: &str = "credentials";
pub const KEY_SYNC_STATE: &str = "syncState";
pub const KEY_PENDING_ACTIONS: &str = "pendingActions";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Emitted after every set or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub removed: bool,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Absent keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Broadcast fan-out shared by the store backends.
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, key: &str, removed: bool) {
        // No subscribers is fine.
        let _ = self.tx.send(StoreChange {
            key: key.to_string(),
            removed,
        });
    }
}
