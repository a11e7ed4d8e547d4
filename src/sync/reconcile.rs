use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;

use super::badge::{BADGE_COLOR, Presenter, badge_text};
use super::relay::RelayTransport;
use super::tabs::TabSource;
use super::{SyncError, SyncReport};
use crate::core::action::PendingActions;
use crate::core::message::{Classified, Outbound, classify};
use crate::core::tab::to_tab_info_list;
use crate::store::StateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No credentials; nothing was touched.
    NotPaired,
    /// Another reconciliation was already running; this trigger was dropped.
    Busy,
    Completed(SyncReport),
}

/// Clears the in-flight flag when a reconciliation ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs send-tabs, poll, merge and persist cycles. At most one cycle is in
/// flight at a time.
pub struct Reconciler {
    state: StateStore,
    tabs: Arc<dyn TabSource>,
    presenter: Arc<dyn Presenter>,
    sender: String,
    acknowledge: bool,
    in_flight: AtomicBool,
    /// Held across every read-modify-write of the pending list.
    pending_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        state: StateStore,
        tabs: Arc<dyn TabSource>,
        presenter: Arc<dyn Presenter>,
        sender: impl Into<String>,
        acknowledge: bool,
    ) -> Self {
        Self {
            state,
            tabs,
            presenter,
            sender: sender.into(),
            acknowledge,
            in_flight: AtomicBool::new(false),
            pending_lock: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle, logging instead of returning failures. Returns whether
    /// the cycle finished without error.
    pub async fn run(&self, relay: Option<&dyn RelayTransport>) -> bool {
        match self.reconcile(relay).await {
            Ok(ReconcileOutcome::Completed(report)) => {
                log::info!(
                    "Sync complete: {} tabs sent, {} polled, {} new actions, {} echoes, cursor {:?}",
                    report.tabs_sent,
                    report.polled,
                    report.added,
                    report.echoes,
                    report.last_message_id,
                );
                if !report.ack_errors.is_empty() {
                    log::warn!("Sync completed with errors: {:?}", report.ack_errors);
                }
                true
            }
            Ok(ReconcileOutcome::Busy) => {
                log::debug!("Sync already in progress, skipping trigger");
                true
            }
            Ok(ReconcileOutcome::NotPaired) => {
                log::debug!("Not paired, nothing to sync");
                true
            }
            Err(e) => {
                log::error!("[clerk] sync error: {}", e);
                false
            }
        }
    }

    /// One full cycle. Progress persisted before a failure is kept; the next
    /// cycle picks up from the stored cursor.
    pub async fn reconcile(
        &self,
        relay: Option<&dyn RelayTransport>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let Some(relay) = relay else {
            return Ok(ReconcileOutcome::NotPaired);
        };
        let Some(_flight) = InFlight::acquire(&self.in_flight) else {
            return Ok(ReconcileOutcome::Busy);
        };

        let mut report = SyncReport::default();

        // Step 1: report tabs
        let raw = self.tabs.query().await?;
        let tabs = to_tab_info_list(&raw);
        report.tabs_sent = tabs.len();
        let out = Outbound::tabs(&self.sender, tabs);
        relay.send(out.payload()?, &out.meta).await?;

        let mut cursor = self.state.get_sync_state().await?.unwrap_or_default();
        cursor.record_tabs(Utc::now(), report.tabs_sent);
        self.state.save_sync_state(&cursor).await?;

        // Step 2: pull everything after the cursor
        let messages = relay.poll(cursor.last_message_id.as_deref()).await?;
        report.polled = messages.len();
        log::debug!(
            "Polled {} messages since {:?}",
            messages.len(),
            cursor.last_message_id
        );

        let pending_guard = self.pending_lock.lock().await;
        let mut pending = self.state.get_pending_actions().await?;
        let before = pending.len();
        let received_at = Utc::now();
        let mut consumed = Vec::new();

        for msg in &messages {
            // Echoes still move the cursor so they are not fetched again.
            if !cursor.advance(&msg.id) {
                log::warn!("Relay returned cursor message {} again", msg.id);
            }

            match classify(msg, &self.sender, received_at) {
                Classified::Echo => {
                    report.echoes += 1;
                    continue;
                }
                Classified::Action(action) => {
                    log::info!("Queued {} action {}: {}", action.kind.as_str(), action.id, action.url);
                    if pending.push(action) {
                        report.added += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Classified::Ignored => {
                    log::debug!("Ignoring message {} from {}", msg.id, msg.sender);
                    report.ignored += 1;
                }
            }
            consumed.push(msg.id.clone());
        }

        // Step 3: actions first, cursor last, so a crash in between
        // re-delivers instead of dropping.
        if pending.len() != before {
            self.state.save_pending_actions(&pending).await?;
        }
        self.show_count(&pending);
        drop(pending_guard);
        self.state.save_sync_state(&cursor).await?;
        report.last_message_id = cursor.last_message_id.clone();

        // Step 4: acknowledge only what is already durable locally
        if self.acknowledge {
            for id in &consumed {
                match relay.delete_message(id).await {
                    Ok(()) => report.acknowledged += 1,
                    Err(e) => report
                        .ack_errors
                        .push(format!("Failed to delete message {}: {}", id, e)),
                }
            }
        }

        Ok(ReconcileOutcome::Completed(report))
    }

    /// Recompute the badge from the stored pending list.
    pub async fn refresh_badge(&self) -> Result<(), SyncError> {
        let pending = self.state.get_pending_actions().await?;
        self.show_count(&pending);
        Ok(())
    }

    /// Remove a pending action and refresh the badge. Unknown ids are fine.
    pub async fn dismiss(&self, id: &str) -> Result<(), SyncError> {
        let _guard = self.pending_lock.lock().await;
        let remaining = self.state.remove_pending_action(id).await?;
        self.show_count(&remaining);
        Ok(())
    }

    fn show_count(&self, pending: &PendingActions) {
        self.presenter.set_badge(&badge_text(pending.len()), BADGE_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{ActionKind, PendingAction};
    use crate::core::message::InboundMessage;
    use crate::core::tab::RawTab;
    use crate::store::{KEY_PENDING_ACTIONS, KeyValueStore, MemoryStore, StoreChange, StoreError};
    use crate::sync::badge::LogPresenter;
    use crate::sync::relay::fake::FakeRelay;
    use crate::sync::tabs::StaticTabSource;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::{Notify, broadcast};

    struct Fixture {
        store: Arc<MemoryStore>,
        state: StateStore,
        presenter: Arc<LogPresenter>,
        reconciler: Arc<Reconciler>,
    }

    fn fixture(acknowledge: bool) -> Fixture {
        let store = MemoryStore::new();
        let state = StateStore::new(store.clone());
        let presenter = Arc::new(LogPresenter::default());
        let tabs = Arc::new(StaticTabSource::new(vec![
            RawTab {
                id: Some(1),
                window_id: 1,
                url: Some("https://a.com".into()),
                title: Some("A".into()),
                active: true,
                pinned: false,
            },
            RawTab {
                id: None,
                window_id: 1,
                url: Some("https://b.com".into()),
                ..Default::default()
            },
        ]));
        let reconciler = Arc::new(Reconciler::new(
            state.clone(),
            tabs,
            presenter.clone(),
            "clerk",
            acknowledge,
        ));
        Fixture {
            store,
            state,
            presenter,
            reconciler,
        }
    }

    fn msg(id: &str, sender: &str, data: Value) -> InboundMessage {
        InboundMessage {
            id: id.into(),
            sender: sender.into(),
            data,
        }
    }

    fn open_tab(id: &str) -> InboundMessage {
        msg(
            id,
            "agent",
            json!({"type": "open-tab", "url": format!("https://x.com/{}", id), "title": "X"}),
        )
    }

    #[tokio::test]
    async fn unpaired_is_a_silent_no_op() {
        let f = fixture(true);
        let outcome = f.reconciler.reconcile(None).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotPaired);
        assert!(f.store.snapshot().await.is_empty());
        assert!(f.reconciler.run(None).await);
    }

    #[tokio::test]
    async fn paired_cycle_queues_open_tab() {
        let f = fixture(true);
        let relay = FakeRelay::with_inbox(vec![open_tab("msg-1")]);

        let outcome = f.reconciler.reconcile(Some(&relay)).await.unwrap();
        let ReconcileOutcome::Completed(report) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.tabs_sent, 1);
        assert_eq!(report.added, 1);

        let sent = relay.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0["type"], "tabs");
        assert_eq!(sent[0].0["tabs"].as_array().unwrap().len(), 1);
        assert_eq!(sent[0].1.sender, "clerk");

        let pending = f.state.get_pending_actions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.iter().next().unwrap().id, "msg-1");

        let cursor = f.state.get_sync_state().await.unwrap().unwrap();
        assert_eq!(cursor.last_message_id.as_deref(), Some("msg-1"));
        assert_eq!(cursor.tab_count, Some(1));
        assert!(cursor.last_sync_at.is_some());

        assert_eq!(relay.deleted(), vec!["msg-1".to_string()]);
        assert_eq!(f.presenter.badge(), "1");
    }

    #[tokio::test]
    async fn echoes_advance_cursor_but_never_queue() {
        let f = fixture(true);
        let relay = FakeRelay::with_inbox(vec![
            msg("msg-1", "clerk", json!({"type": "open-tab", "url": "https://self.com"})),
            msg("msg-2", "clerk", json!({"type": "tabs", "tabs": []})),
        ]);

        f.reconciler.reconcile(Some(&relay)).await.unwrap();

        assert!(f.state.get_pending_actions().await.unwrap().is_empty());
        let cursor = f.state.get_sync_state().await.unwrap().unwrap();
        assert_eq!(cursor.last_message_id.as_deref(), Some("msg-2"));
        // Echoes are left for the other side to read.
        assert!(relay.deleted().is_empty());
        assert_eq!(f.presenter.badge(), "");
    }

    #[tokio::test]
    async fn next_poll_starts_after_cursor() {
        let f = fixture(false);
        let relay = FakeRelay::with_inbox(vec![open_tab("msg-1")]);

        f.reconciler.reconcile(Some(&relay)).await.unwrap();
        relay.push(open_tab("msg-2"));
        f.reconciler.reconcile(Some(&relay)).await.unwrap();

        assert_eq!(relay.polls(), vec![None, Some("msg-1".to_string())]);
        assert_eq!(f.state.get_pending_actions().await.unwrap().len(), 2);
        assert!(relay.deleted().is_empty());
    }

    #[tokio::test]
    async fn cursor_follows_relay_order_not_id_shape() {
        let f = fixture(true);
        // Lexically ordered ids that a numeric comparison would reverse.
        let relay = FakeRelay::with_inbox(vec![
            msg("0A10", "clerk", json!({"type": "tabs", "tabs": []})),
            msg("0A9B", "clerk", json!({"type": "tabs", "tabs": []})),
        ]);

        for _ in 0..3 {
            f.reconciler.reconcile(Some(&relay)).await.unwrap();
        }

        let cursor = f.state.get_sync_state().await.unwrap().unwrap();
        assert_eq!(cursor.last_message_id.as_deref(), Some("0A9B"));
        assert_eq!(
            relay.polls(),
            vec![None, Some("0A9B".to_string()), Some("0A9B".to_string())]
        );
    }

    #[tokio::test]
    async fn cursor_keeps_moving_forward_across_cycles() {
        let f = fixture(false);
        let relay = FakeRelay::with_inbox(vec![open_tab("msg-9"), open_tab("msg-10")]);
        let mut seen = Vec::new();
        for next in ["msg-11", "msg-12"] {
            f.reconciler.reconcile(Some(&relay)).await.unwrap();
            seen.push(f.state.get_sync_state().await.unwrap().unwrap().last_message_id);
            relay.push(open_tab(next));
        }
        f.reconciler.reconcile(Some(&relay)).await.unwrap();
        seen.push(f.state.get_sync_state().await.unwrap().unwrap().last_message_id);

        let expected: Vec<Option<String>> = ["msg-10", "msg-11", "msg-12"]
            .iter()
            .map(|id| Some(id.to_string()))
            .collect();
        assert_eq!(seen, expected);
        assert_eq!(f.state.get_pending_actions().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn redelivered_message_is_not_duplicated() {
        let f = fixture(false);
        let relay = FakeRelay::with_inbox(vec![open_tab("msg-1")]);
        f.reconciler.reconcile(Some(&relay)).await.unwrap();

        // Simulate a lost cursor write: the same message comes back.
        f.state
            .save_sync_state(&Default::default())
            .await
            .unwrap();
        let outcome = f.reconciler.reconcile(Some(&relay)).await.unwrap();
        let ReconcileOutcome::Completed(report) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.duplicates, 1);
        assert_eq!(f.state.get_pending_actions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_failure_keeps_tab_report() {
        let f = fixture(true);
        let relay = FakeRelay::with_inbox(vec![open_tab("msg-1")]);
        relay.set_fail_poll(true);

        assert!(f.reconciler.reconcile(Some(&relay)).await.is_err());
        assert!(!f.reconciler.run(Some(&relay)).await);
        assert!(!f.reconciler.is_running());

        let cursor = f.state.get_sync_state().await.unwrap().unwrap();
        assert_eq!(cursor.tab_count, Some(1));
        assert_eq!(cursor.last_message_id, None);
        assert!(relay.deleted().is_empty());

        relay.set_fail_poll(false);
        assert!(f.reconciler.run(Some(&relay)).await);
        assert_eq!(f.state.get_pending_actions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_types_are_consumed_silently() {
        let f = fixture(true);
        let relay = FakeRelay::with_inbox(vec![msg("msg-1", "agent", json!({"type": "noise"}))]);
        f.reconciler.reconcile(Some(&relay)).await.unwrap();
        assert!(f.state.get_pending_actions().await.unwrap().is_empty());
        assert_eq!(relay.deleted(), vec!["msg-1".to_string()]);
    }

    #[tokio::test]
    async fn dismiss_updates_badge() {
        let f = fixture(false);
        let relay = FakeRelay::with_inbox(vec![open_tab("msg-1"), open_tab("msg-2")]);
        f.reconciler.reconcile(Some(&relay)).await.unwrap();
        assert_eq!(f.presenter.badge(), "2");

        f.reconciler.dismiss("msg-1").await.unwrap();
        f.reconciler.dismiss("msg-1").await.unwrap();
        assert_eq!(f.presenter.badge(), "1");
        assert_eq!(f.state.get_pending_actions().await.unwrap().len(), 1);
    }

    /// Relay whose poll blocks until released.
    struct GatedRelay {
        inner: FakeRelay,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RelayTransport for GatedRelay {
        async fn send(
            &self,
            payload: Value,
            meta: &crate::core::message::MessageMeta,
        ) -> Result<(), SyncError> {
            self.inner.send(payload, meta).await
        }

        async fn poll(&self, since: Option<&str>) -> Result<Vec<InboundMessage>, SyncError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.poll(since).await
        }

        async fn delete_message(&self, id: &str) -> Result<(), SyncError> {
            self.inner.delete_message(id).await
        }
    }

    #[tokio::test]
    async fn overlapping_trigger_is_dropped() {
        let f = fixture(false);
        let relay = Arc::new(GatedRelay {
            inner: FakeRelay::with_inbox(vec![open_tab("msg-1")]),
            entered: Notify::new(),
            release: Notify::new(),
        });

        let first = {
            let reconciler = f.reconciler.clone();
            let relay = relay.clone();
            tokio::spawn(async move { reconciler.reconcile(Some(relay.as_ref())).await })
        };
        relay.entered.notified().await;
        assert!(f.reconciler.is_running());

        let second = f.reconciler.reconcile(Some(relay.as_ref())).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Busy);

        relay.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, ReconcileOutcome::Completed(_)));
        assert_eq!(f.state.get_pending_actions().await.unwrap().len(), 1);
        assert_eq!(relay.inner.sent().len(), 1);
    }

    /// Store that holds back the first pending-list write until released.
    struct HeldStore {
        inner: Arc<MemoryStore>,
        held: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl KeyValueStore for HeldStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            if key == KEY_PENDING_ACTIONS && !self.held.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
            self.inner.remove(keys).await
        }

        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn dismiss_during_merge_is_not_lost() {
        let inner = MemoryStore::new();
        let mut seeded = PendingActions::default();
        seeded.push(PendingAction {
            id: "old".into(),
            kind: ActionKind::OpenTab,
            url: "https://old.com".into(),
            title: String::new(),
            message: String::new(),
            received_at: Utc::now(),
        });
        StateStore::new(inner.clone())
            .save_pending_actions(&seeded)
            .await
            .unwrap();

        let store = Arc::new(HeldStore {
            inner,
            held: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let state = StateStore::new(store.clone());
        let presenter = Arc::new(LogPresenter::default());
        let reconciler = Arc::new(Reconciler::new(
            state.clone(),
            Arc::new(StaticTabSource::default()),
            presenter.clone(),
            "clerk",
            false,
        ));
        let relay = Arc::new(FakeRelay::with_inbox(vec![open_tab("msg-1")]));

        let cycle = {
            let reconciler = reconciler.clone();
            let relay = relay.clone();
            tokio::spawn(async move { reconciler.reconcile(Some(relay.as_ref())).await })
        };
        store.entered.notified().await;

        let dismiss = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.dismiss("old").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!dismiss.is_finished());

        store.release.notify_one();
        cycle.await.unwrap().unwrap();
        dismiss.await.unwrap().unwrap();

        let pending = state.get_pending_actions().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["msg-1"]);
        assert_eq!(presenter.badge(), "1");
    }
}
