pub mod badge;
pub mod pairing;
pub mod reconcile;
pub mod relay;
pub mod tabs;

use chrono::{DateTime, Utc};

use crate::core::message::Outbound;
use crate::store::StoreError;
use relay::RelayTransport;

pub use reconcile::{ReconcileOutcome, Reconciler};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected relay response: {0}")]
    Decode(String),
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("pairing failed: {0}")]
    Pairing(String),
    #[error("tab query failed: {0}")]
    Tabs(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Current sync status displayed by status surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error(String),
    LastSynced(String), // formatted timestamp
}

/// Counters from one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tabs_sent: usize,
    pub polled: usize,
    pub echoes: usize,
    pub ignored: usize,
    /// Actions newly queued.
    pub added: usize,
    /// Re-delivered ids already queued.
    pub duplicates: usize,
    pub acknowledged: usize,
    pub ack_errors: Vec<String>,
    pub last_message_id: Option<String>,
}

/// Send a free-text note, optionally tied to the page it came from.
pub async fn send_memo(
    relay: &dyn RelayTransport,
    sender: &str,
    text: &str,
    url: Option<&str>,
) -> Result<(), SyncError> {
    let out = Outbound::memo(sender, text, url.map(str::to_string));
    relay.send(out.payload()?, &out.meta).await
}

/// Ask the far side to add a link to its brief.
pub async fn save_link(
    relay: &dyn RelayTransport,
    sender: &str,
    url: &str,
    title: &str,
    at: DateTime<Utc>,
) -> Result<(), SyncError> {
    let out = Outbound::save_link(sender, url, title, at);
    relay.send(out.payload()?, &out.meta).await
}
