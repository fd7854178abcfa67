use serde::{Deserialize, Serialize};
use std::fmt;

/// A fan-out topic. Notifications are addressed to topics, never to sockets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    /// Every connection bound to one identity.
    Identity(String),
    /// Participants of one chat.
    Chat(String),
    /// Participants and live-stream viewers of one call.
    Call(String),
    /// Subscribers of one event's host channel.
    EventHost(String),
    /// Platform-wide announcements.
    Global,
}

impl Topic {
    pub fn identity(id: impl Into<String>) -> Self {
        Self::Identity(id.into())
    }

    pub fn chat(id: impl Into<String>) -> Self {
        Self::Chat(id.into())
    }

    pub fn call(id: impl Into<String>) -> Self {
        Self::Call(id.into())
    }

    pub fn event_host(id: impl Into<String>) -> Self {
        Self::EventHost(id.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(id) => write!(f, "identity:{id}"),
            Self::Chat(id) => write!(f, "chat:{id}"),
            Self::Call(id) => write!(f, "call:{id}"),
            Self::EventHost(id) => write!(f, "event:{id}"),
            Self::Global => f.write_str("global"),
        }
    }
}
