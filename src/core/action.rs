use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "open-tab")]
    OpenTab,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenTab => "open-tab",
        }
    }

    pub fn from_type(s: &str) -> Option<Self> {
        match s {
            "open-tab" => Some(Self::OpenTab),
            _ => None,
        }
    }
}

/// An inbound command waiting for the user. `id` is the originating
/// message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub received_at: DateTime<Utc>,
}

/// Ordered list of pending actions. The badge count is always `len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingActions(Vec<PendingAction>);

impl PendingActions {
    pub fn new(actions: Vec<PendingAction>) -> Self {
        Self(actions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.0.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|a| a.id == id)
    }

    /// Append unless an action with the same id is already queued.
    pub fn push(&mut self, action: PendingAction) -> bool {
        if self.contains(&action.id) {
            return false;
        }
        self.0.push(action);
        true
    }

    /// Remove the first action with `id`. Missing ids are a no-op.
    pub fn dismiss(&mut self, id: &str) -> Option<PendingAction> {
        let pos = self.0.iter().position(|a| a.id == id)?;
        Some(self.0.remove(pos))
    }

    pub fn into_vec(self) -> Vec<PendingAction> {
        self.0
    }
}
