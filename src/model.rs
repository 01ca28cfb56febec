use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Where a reply goes and whose collection an event touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingMeta {
    pub chat_id: i64,
    pub username: String,
}

/// A normalized inbound update, consumed exactly once by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message {
        text: String,
        meta: RoutingMeta,
    },
    CallbackQuery {
        text: String,
        meta: RoutingMeta,
        callback_id: String,
    },
    Unknown {
        update_id: i64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Message { .. } => "message",
            Event::CallbackQuery { .. } => "callback_query",
            Event::Unknown { .. } => "unknown",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Event::Message { text, .. } | Event::CallbackQuery { text, .. } => text,
            Event::Unknown { .. } => "",
        }
    }
}

/// Per-chat status written to the conversation state store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationStatus {
    WaitingForInput,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::WaitingForInput => "waiting_for_input",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "waiting_for_input" => Some(ConversationStatus::WaitingForInput),
            _ => None,
        }
    }
}

/// A page saved by one user. Items are never updated, only saved and removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub url: String,
    pub owner: String,
}

impl Item {
    pub fn new(url: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            owner: owner.into(),
        }
    }

    /// Content address: hex sha1 over the url bytes followed by the owner bytes.
    pub fn hash(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.url.as_bytes());
        hasher.update(self.owner.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
