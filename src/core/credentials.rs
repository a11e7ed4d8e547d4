use serde::{Deserialize, Serialize};

/// Durable result of a successful pairing. Absence means "unpaired".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub worker_url: String,
    pub api_key: String,
    /// Base64-encoded symmetric channel key.
    pub channel_key: String,
    pub channel_id: String,
}

impl Credentials {
    /// Short channel label for status displays.
    pub fn channel_prefix(&self) -> &str {
        match self.channel_id.char_indices().nth(8) {
            Some((idx, _)) => &self.channel_id[..idx],
            None => &self.channel_id,
        }
    }

    /// A transport needs all three of endpoint, API key and channel key.
    pub fn is_complete(&self) -> bool {
        !self.worker_url.trim().is_empty()
            && !self.api_key.is_empty()
            && !self.channel_key.is_empty()
    }
}
