//! Application message envelope
//!
//! Every message exchanged through the hub carries the same six fields on
//! the wire:
//!
//! ```text
//! {"type":0,"sender_id":"A","to":[],"action":"greet","title":"hello","body":"hi"}
//! ```
//!
//! `type` is `0` for broadcast and `1` for targeted delivery. `to` is only
//! consulted for targeted messages but is always serialized.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Delivery mode of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageKind {
    /// Deliver to every registered session except the sender
    #[default]
    Broadcast,
    /// Deliver only to the listed recipients, never to the sender
    Targeted,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Broadcast => 0,
            MessageKind::Targeted => 1,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = UnknownKind;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Broadcast),
            1 => Ok(MessageKind::Targeted),
            other => Err(UnknownKind(other)),
        }
    }
}

/// Raised when a wire `type` value is neither 0 nor 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownKind(pub u8);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown message type {}", self.0)
    }
}

/// Message routed by the hub and received by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub to: Vec<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Value,
}

impl Message {
    /// Message for every session except `sender_id`
    pub fn broadcast(sender_id: impl Into<String>, body: impl Into<Value>) -> Self {
        Self {
            kind: MessageKind::Broadcast,
            sender_id: sender_id.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Message for the sessions listed in `to`, excluding `sender_id`
    pub fn targeted<I, S>(sender_id: impl Into<String>, to: I, body: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: MessageKind::Targeted,
            sender_id: sender_id.into(),
            to: to.into_iter().map(Into::into).collect(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.kind == MessageKind::Broadcast
    }

    /// Whether a session with `identity` should receive this message
    ///
    /// The sender never receives its own message, whatever the kind and
    /// even when it lists itself in `to`.
    pub fn is_deliverable_to(&self, identity: &str) -> bool {
        if self.sender_id == identity {
            return false;
        }
        match self.kind {
            MessageKind::Broadcast => true,
            MessageKind::Targeted => self.to.iter().any(|to| to == identity),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
