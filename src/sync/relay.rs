use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SyncError;
use crate::core::credentials::Credentials;
use crate::core::message::{InboundMessage, MessageMeta};

/// Message relay shared with the paired agent.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, payload: Value, meta: &MessageMeta) -> Result<(), SyncError>;

    /// Messages with ids after `since`, oldest first.
    async fn poll(&self, since: Option<&str>) -> Result<Vec<InboundMessage>, SyncError>;

    async fn delete_message(&self, id: &str) -> Result<(), SyncError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    sender: &'a str,
    content_type: &'a str,
    payload: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PollBody {
    Wrapped { messages: Vec<Value> },
    Bare(Vec<Value>),
}

impl PollBody {
    /// Entries that do not decode are logged and skipped.
    fn into_messages(self) -> Vec<InboundMessage> {
        let (Self::Wrapped { messages } | Self::Bare(messages)) = self;
        messages
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<InboundMessage>(entry.clone()) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    log::warn!("Skipping malformed relay message {}: {}", entry, e);
                    None
                }
            })
            .collect()
    }
}

/// HTTP client for the relay worker.
#[derive(Clone)]
pub struct RelayClient {
    base_url: Url,
    api_key: String,
    http: Client,
}

impl RelayClient {
    /// The channel key seals payloads end to end and stays with the
    /// credentials; the relay itself only needs the API key.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder().build()?;
        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            http,
        })
    }

    /// `None` when the credentials lack an endpoint, API key or channel key.
    pub fn from_credentials(creds: &Credentials) -> Result<Option<Self>, SyncError> {
        if !creds.is_complete() {
            return Ok(None);
        }
        Self::new(&creds.worker_url, &creds.api_key).map(Some)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn messages_url(&self) -> Url {
        self.endpoint(&["messages"])
    }

    /// `<base>/messages/<id>`, with `id` escaped as a single path segment.
    fn message_url(&self, id: &str) -> Url {
        self.endpoint(&["messages", id])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL always has path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RelayTransport for RelayClient {
    async fn send(&self, payload: Value, meta: &MessageMeta) -> Result<(), SyncError> {
        let body = SendBody {
            sender: &meta.sender,
            content_type: &meta.content_type,
            payload,
        };
        let resp = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn poll(&self, since: Option<&str>) -> Result<Vec<InboundMessage>, SyncError> {
        let mut req = self.http.get(self.messages_url()).bearer_auth(&self.api_key);
        if let Some(since) = since {
            req = req.query(&[("since", since)]);
        }
        let resp = check(req.send().await?).await?;
        let text = resp.text().await?;
        let body: PollBody = serde_json::from_str(&text)
            .map_err(|e| SyncError::Decode(format!("poll: {}", e)))?;
        Ok(body.into_messages())
    }

    async fn delete_message(&self, id: &str) -> Result<(), SyncError> {
        let resp = self
            .http
            .delete(self.message_url(id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }
}


#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Scripted in-memory relay. Messages are ordered by arrival, not by id;
    /// deleted messages keep their place so `since` still resolves.
    #[derive(Default)]
    pub struct FakeRelay {
        pub inbox: Mutex<Vec<InboundMessage>>,
        pub sent: Mutex<Vec<(Value, MessageMeta)>>,
        pub deleted: Mutex<Vec<String>>,
        pub polls: Mutex<Vec<Option<String>>>,
        pub fail_poll: AtomicBool,
        pub fail_send: AtomicBool,
    }

    impl FakeRelay {
        pub fn with_inbox(messages: Vec<InboundMessage>) -> Self {
            Self {
                inbox: Mutex::new(messages),
                ..Default::default()
            }
        }

        pub fn push(&self, msg: InboundMessage) {
            self.inbox.lock().unwrap().push(msg);
        }

        pub fn set_fail_poll(&self, fail: bool) {
            self.fail_poll.store(fail, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<(Value, MessageMeta)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }

        pub fn polls(&self) -> Vec<Option<String>> {
            self.polls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelayTransport for FakeRelay {
        async fn send(&self, payload: Value, meta: &MessageMeta) -> Result<(), SyncError> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(SyncError::Http { status: 503, body: "down".into() });
            }
            self.sent.lock().unwrap().push((payload, meta.clone()));
            Ok(())
        }

        async fn poll(&self, since: Option<&str>) -> Result<Vec<InboundMessage>, SyncError> {
            self.polls.lock().unwrap().push(since.map(str::to_string));
            if self.fail_poll.load(Ordering::SeqCst) {
                return Err(SyncError::Http { status: 500, body: "boom".into() });
            }
            let inbox = self.inbox.lock().unwrap();
            let deleted = self.deleted.lock().unwrap();
            let start = since
                .and_then(|s| inbox.iter().position(|m| m.id == s))
                .map_or(0, |i| i + 1);
            Ok(inbox[start..]
                .iter()
                .filter(|m| !deleted.contains(&m.id))
                .cloned()
                .collect())
        }

        async fn delete_message(&self, id: &str) -> Result<(), SyncError> {
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }
}
