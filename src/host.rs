//! Process lifecycle and the intent protocol spoken by UI surfaces.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::ClerkConfig;
use crate::core::action::PendingAction;
use crate::core::credentials::Credentials;
use crate::store::{KeyValueStore, StateStore};
use crate::sync::badge::{Presenter, SAVED_NOTICE};
use crate::sync::relay::{RelayClient, RelayTransport};
use crate::sync::tabs::TabSource;
use crate::sync::{self, Reconciler, SyncError, SyncStatus};

/// Requests UI surfaces send to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Intent {
    SyncNow,
    SendMessage {
        text: String,
        #[serde(default)]
        url: Option<String>,
    },
    SaveToBrief {
        url: String,
        title: String,
    },
    DismissAction {
        id: String,
    },
    Paired,
    Unpaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResponse {
    pub ok: bool,
}

impl IntentResponse {
    fn from_ok(ok: bool) -> Self {
        Self { ok }
    }
}

/// What status surfaces show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub paired: bool,
    pub channel: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub tab_count: Option<usize>,
    pub pending: Vec<PendingAction>,
}

/// Builds a relay client from stored credentials; `None` means unpaired.
pub type RelayFactory =
    Arc<dyn Fn(&Credentials) -> Result<Option<Arc<dyn RelayTransport>>, SyncError> + Send + Sync>;

fn http_relay_factory() -> RelayFactory {
    Arc::new(|creds: &Credentials| -> Result<Option<Arc<dyn RelayTransport>>, SyncError> {
        Ok(RelayClient::from_credentials(creds)?
            .map(|client| Arc::new(client) as Arc<dyn RelayTransport>))
    })
}

pub struct Host {
    config: ClerkConfig,
    state: StateStore,
    reconciler: Reconciler,
    presenter: Arc<dyn Presenter>,
    connect: RelayFactory,
    status: Mutex<SyncStatus>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Host {
    pub fn new(
        config: ClerkConfig,
        store: Arc<dyn KeyValueStore>,
        tabs: Arc<dyn TabSource>,
        presenter: Arc<dyn Presenter>,
    ) -> Arc<Self> {
        Self::with_relay_factory(config, store, tabs, presenter, http_relay_factory())
    }

    pub fn with_relay_factory(
        config: ClerkConfig,
        store: Arc<dyn KeyValueStore>,
        tabs: Arc<dyn TabSource>,
        presenter: Arc<dyn Presenter>,
        connect: RelayFactory,
    ) -> Arc<Self> {
        let state = StateStore::new(store);
        let reconciler = Reconciler::new(
            state.clone(),
            tabs,
            presenter.clone(),
            config.sender.clone(),
            config.acknowledge,
        );
        Arc::new(Self {
            config,
            state,
            reconciler,
            presenter,
            connect,
            status: Mutex::new(SyncStatus::default()),
            timer: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.status.lock().await.clone()
    }

    /// Resolve a relay from current credentials.
    async fn relay(&self) -> Result<Option<Arc<dyn RelayTransport>>, SyncError> {
        match self.state.get_credentials().await? {
            Some(creds) => (self.connect)(&creds),
            None => Ok(None),
        }
    }

    /// Install/startup: restore the badge, start the timer, and sync right
    /// away when already paired. Calling it again is harmless.
    pub async fn start(self: &Arc<Self>) {
        if let Err(e) = self.reconciler.refresh_badge().await {
            log::error!("[clerk] badge refresh error: {}", e);
        }
        self.start_timer().await;

        match self.state.get_credentials().await {
            Ok(Some(_)) => {
                self.sync_now().await;
            }
            Ok(None) => log::info!("Not paired; waiting for pairing"),
            Err(e) => log::error!("[clerk] startup error: {}", e),
        }
    }

    /// Register the periodic sync once. The task holds only a weak handle so
    /// dropping the host ends it.
    pub async fn start_timer(self: &Arc<Self>) {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let period = self.config.poll_interval();
        let weak: Weak<Self> = Arc::downgrade(self);
        log::info!("Starting sync timer every {}s", period.as_secs());

        *timer = Some(tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let Some(host) = weak.upgrade() else { break };
                host.sync_now().await;
            }
        }));
    }

    /// Teardown: stop the timer.
    pub async fn stop(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
            log::info!("Sync timer stopped");
        }
    }

    pub async fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Full reconciliation. Failures are logged; the result only says
    /// whether the cycle completed.
    pub async fn sync_now(&self) -> bool {
        let relay = match self.relay().await {
            Ok(relay) => relay,
            Err(e) => {
                log::error!("[clerk] sync error: {}", e);
                *self.status.lock().await = SyncStatus::Error(e.to_string());
                return false;
            }
        };
        let Some(relay) = relay else {
            return self.reconciler.run(None).await;
        };

        let was_idle = !self.reconciler.is_running();
        if was_idle {
            *self.status.lock().await = SyncStatus::Syncing;
        }
        let ok = self.reconciler.run(Some(relay.as_ref())).await;
        if was_idle {
            *self.status.lock().await = if ok {
                SyncStatus::LastSynced(Utc::now().format("%H:%M:%S").to_string())
            } else {
                SyncStatus::Error("sync failed".into())
            };
        }
        ok
    }

    pub async fn send_message(&self, text: &str, url: Option<&str>) -> bool {
        self.with_relay("sendMessage", |relay, sender| async move {
            sync::send_memo(relay.as_ref(), &sender, text, url).await
        })
        .await
    }

    /// Send a save-link command and confirm it to the user.
    pub async fn save_to_brief(&self, url: &str, title: &str) -> bool {
        let ok = self
            .with_relay("saveToBrief", |relay, sender| async move {
                sync::save_link(relay.as_ref(), &sender, url, title, Utc::now()).await
            })
            .await;
        if ok {
            self.presenter.notify(SAVED_NOTICE);
        }
        ok
    }

    async fn with_relay<F, Fut>(&self, what: &str, f: F) -> bool
    where
        F: FnOnce(Arc<dyn RelayTransport>, String) -> Fut,
        Fut: std::future::Future<Output = Result<(), SyncError>>,
    {
        let relay = match self.relay().await {
            Ok(Some(relay)) => relay,
            Ok(None) => {
                log::debug!("Not paired, dropping {}", what);
                return true;
            }
            Err(e) => {
                log::error!("[clerk] {} error: {}", what, e);
                return false;
            }
        };
        match f(relay, self.config.sender.clone()).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("[clerk] {} error: {}", what, e);
                false
            }
        }
    }

    pub async fn dismiss_action(&self, id: &str) -> bool {
        match self.reconciler.dismiss(id).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("[clerk] dismissAction error: {}", e);
                false
            }
        }
    }

    /// Single entry point for UI intents.
    pub async fn handle(self: &Arc<Self>, intent: Intent) -> IntentResponse {
        log::debug!("Intent: {:?}", intent);
        let ok = match intent {
            Intent::SyncNow => self.sync_now().await,
            Intent::SendMessage { text, url } => self.send_message(&text, url.as_deref()).await,
            Intent::SaveToBrief { url, title } => self.save_to_brief(&url, &title).await,
            Intent::DismissAction { id } => self.dismiss_action(&id).await,
            Intent::Paired => {
                self.start_timer().await;
                self.sync_now().await
            }
            Intent::Unpaired => {
                self.stop().await;
                if let Err(e) = self.reconciler.refresh_badge().await {
                    log::error!("[clerk] badge refresh error: {}", e);
                }
                true
            }
        };
        IntentResponse::from_ok(ok)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, SyncError> {
        let creds = self.state.get_credentials().await?;
        let cursor = self.state.get_sync_state().await?.unwrap_or_default();
        let pending = self.state.get_pending_actions().await?;
        Ok(StatusSnapshot {
            paired: creds.is_some(),
            channel: creds.map(|c| c.channel_prefix().to_string()),
            last_sync_at: cursor.last_sync_at,
            tab_count: cursor.tab_count,
            pending: pending.into_vec(),
        })
    }
}
