use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{ActionKind, PendingAction};
use super::tab::TabInfo;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A message as returned by a relay poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub data: Value,
}

/// Envelope metadata attached to every outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    pub sender: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundBody {
    #[serde(rename = "tabs")]
    Tabs { tabs: Vec<TabInfo> },
    #[serde(rename = "memo")]
    Memo {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    #[serde(rename = "save-to-brief")]
    SaveToBrief {
        url: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub meta: MessageMeta,
    pub body: OutboundBody,
}

impl Outbound {
    fn new(sender: &str, body: OutboundBody) -> Self {
        Self {
            meta: MessageMeta {
                sender: sender.to_string(),
                content_type: CONTENT_TYPE_JSON.to_string(),
            },
            body,
        }
    }

    pub fn tabs(sender: &str, tabs: Vec<TabInfo>) -> Self {
        Self::new(sender, OutboundBody::Tabs { tabs })
    }

    pub fn memo(sender: &str, text: impl Into<String>, url: Option<String>) -> Self {
        Self::new(
            sender,
            OutboundBody::Memo {
                text: text.into(),
                url,
            },
        )
    }

    pub fn save_link(
        sender: &str,
        url: impl Into<String>,
        title: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            sender,
            OutboundBody::SaveToBrief {
                url: url.into(),
                title: title.into(),
                timestamp,
            },
        )
    }

    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.body)
    }
}

/// What an inbound message means to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Sent by this instance; never becomes an action.
    Echo,
    Action(PendingAction),
    /// Unknown or malformed payload.
    Ignored,
}

pub fn classify(
    msg: &InboundMessage,
    local_sender: &str,
    received_at: DateTime<Utc>,
) -> Classified {
    if msg.sender == local_sender {
        return Classified::Echo;
    }

    let Some(kind) = msg
        .data
        .get("type")
        .and_then(Value::as_str)
        .and_then(ActionKind::from_type)
    else {
        return Classified::Ignored;
    };

    let field = |name: &str| msg.data.get(name).and_then(Value::as_str).map(str::to_string);

    match kind {
        ActionKind::OpenTab => match field("url") {
            Some(url) => Classified::Action(PendingAction {
                id: msg.id.clone(),
                kind,
                url,
                title: field("title").unwrap_or_default(),
                message: field("message").unwrap_or_default(),
                received_at,
            }),
            None => Classified::Ignored,
        },
    }
}
