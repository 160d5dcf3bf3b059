//! Wire frames exchanged with the external chat-client process.
//!
//! One JSON object per frame. Outbound commands carry a correlation id the
//! process echoes back; unsolicited events arrive with an empty `corrId`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound frame: one command, tagged with a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    #[serde(rename = "corrId")]
    pub corr_id: String,
    pub cmd: String,
}

/// Inbound frame. `corr_id` is empty for unsolicited events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(rename = "corrId", default)]
    pub corr_id: String,
    pub resp: ChatResponse,
}

/// The chat client wraps every response in an Either: `Right` for success,
/// `Left` for an error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatResponse {
    Right(EventPayload),
    Left(Value),
}

/// Body of a successful response or event, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ResponseFrame {
    /// Whether this frame is an unsolicited event rather than a command reply.
    pub fn is_event(&self) -> bool {
        self.corr_id.is_empty()
    }

    /// The declared event kind, if this is a successful/event frame.
    pub fn event_kind(&self) -> Option<EventKind> {
        match &self.resp {
            ChatResponse::Right(payload) => EventKind::from_type(&payload.kind),
            ChatResponse::Left(_) => None,
        }
    }
}

/// Unsolicited message kinds the gateway dispatches to registered handlers.
/// Kinds not listed here are dropped with a debug note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewChatItem,
    NewChatItems,
    ContactConnected,
    ReceivedContactRequest,
    ContactsList,
    GroupsList,
}

impl EventKind {
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "newChatItem" => Some(Self::NewChatItem),
            "newChatItems" => Some(Self::NewChatItems),
            "contactConnected" => Some(Self::ContactConnected),
            "receivedContactRequest" => Some(Self::ReceivedContactRequest),
            "contactsList" => Some(Self::ContactsList),
            "groupsList" => Some(Self::GroupsList),
            _ => None,
        }
    }

    pub fn as_type(&self) -> &'static str {
        match self {
            Self::NewChatItem => "newChatItem",
            Self::NewChatItems => "newChatItems",
            Self::ContactConnected => "contactConnected",
            Self::ReceivedContactRequest => "receivedContactRequest",
            Self::ContactsList => "contactsList",
            Self::GroupsList => "groupsList",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_type())
    }
}
