use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use super::{
    KEY_CREDENTIALS, KEY_PENDING_ACTIONS, KEY_SYNC_STATE, KeyValueStore, StoreChange, StoreError,
};
use crate::core::action::PendingActions;
use crate::core::credentials::Credentials;
use crate::core::cursor::SyncCursor;

/// Typed view over a [`KeyValueStore`]. Every record tolerates absence.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<dyn KeyValueStore>,
}

impl StateStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.inner.get(key).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.inner.set(key, serde_json::to_value(value)?).await
    }

    pub async fn get_credentials(&self) -> Result<Option<Credentials>, StoreError> {
        self.read(KEY_CREDENTIALS).await
    }

    pub async fn save_credentials(&self, creds: &Credentials) -> Result<(), StoreError> {
        self.write(KEY_CREDENTIALS, creds).await
    }

    /// Disconnect: drops credentials and the cursor so a later pairing
    /// starts fresh. Pending actions are left for the user.
    pub async fn clear_credentials(&self) -> Result<(), StoreError> {
        self.inner.remove(&[KEY_CREDENTIALS, KEY_SYNC_STATE]).await
    }

    pub async fn get_sync_state(&self) -> Result<Option<SyncCursor>, StoreError> {
        self.read(KEY_SYNC_STATE).await
    }

    pub async fn save_sync_state(&self, state: &SyncCursor) -> Result<(), StoreError> {
        self.write(KEY_SYNC_STATE, state).await
    }

    pub async fn get_pending_actions(&self) -> Result<PendingActions, StoreError> {
        Ok(self.read(KEY_PENDING_ACTIONS).await?.unwrap_or_default())
    }

    pub async fn save_pending_actions(&self, actions: &PendingActions) -> Result<(), StoreError> {
        self.write(KEY_PENDING_ACTIONS, actions).await
    }

    /// Returns the remaining list. Dismissing an absent id writes nothing.
    pub async fn remove_pending_action(&self, id: &str) -> Result<PendingActions, StoreError> {
        let mut actions = self.get_pending_actions().await?;
        if actions.dismiss(id).is_some() {
            self.save_pending_actions(&actions).await?;
        }
        Ok(actions)
    }
}
