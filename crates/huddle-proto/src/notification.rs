//! The closed set of server-pushed notifications.
//!
//! Every notification the coordinator publishes is one of these variants.
//! On the wire a notification is `{"event": "<Name>", "data": {..}}`.

use crate::model::{
    CallSession, ChatSession, Connection, Event, Message, PollView, SessionRequest, ViewerEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Notification {
    // Presence
    IdentityOnline {
        identity_id: String,
    },
    IdentityOffline {
        identity_id: String,
    },
    OnlineSnapshot {
        identities: Vec<String>,
    },

    // Consent
    ConnectionRequested {
        connection: Connection,
    },
    ConnectionUpdated {
        connection: Connection,
    },

    // Requests and chats
    SessionRequested {
        request: SessionRequest,
    },
    SessionRequestUpdated {
        request: SessionRequest,
    },
    ChatCreated {
        chat: ChatSession,
    },
    MessageCreated {
        message: Message,
    },
    MessagesRead {
        chat_id: String,
        reader: String,
        count: usize,
        at: DateTime<Utc>,
    },
    Typing {
        chat_id: String,
        identity_id: String,
        typing: bool,
    },

    // Calls
    CallIncoming {
        call: CallSession,
    },
    CallOffered {
        call: CallSession,
    },
    CallAccepted {
        call: CallSession,
        app_id: String,
        relay_token: String,
    },
    CallRejected {
        call: CallSession,
    },
    CallEnded {
        call: CallSession,
    },
    StreamViewersUpdated {
        call_id: String,
        viewers: Vec<String>,
        count: usize,
    },

    // Broadcasts
    BroadcastStarted {
        event: Event,
    },
    BroadcastStopped {
        event_id: String,
        completed: bool,
    },
    RosterUpdated {
        event_id: String,
        viewers: Vec<ViewerEntry>,
        count: usize,
    },
    EventCreated {
        event: Event,
    },
    EventUpdated {
        event: Event,
    },
    EventDeleted {
        event_id: String,
    },
    PollCreated {
        poll: PollView,
    },
    PollUpdated {
        poll: PollView,
    },
    PollDeleted {
        event_id: String,
        poll_id: String,
    },
}

impl Notification {
    /// Notification name as it appears in the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IdentityOnline { .. } => "IdentityOnline",
            Self::IdentityOffline { .. } => "IdentityOffline",
            Self::OnlineSnapshot { .. } => "OnlineSnapshot",
            Self::ConnectionRequested { .. } => "ConnectionRequested",
            Self::ConnectionUpdated { .. } => "ConnectionUpdated",
            Self::SessionRequested { .. } => "SessionRequested",
            Self::SessionRequestUpdated { .. } => "SessionRequestUpdated",
            Self::ChatCreated { .. } => "ChatCreated",
            Self::MessageCreated { .. } => "MessageCreated",
            Self::MessagesRead { .. } => "MessagesRead",
            Self::Typing { .. } => "Typing",
            Self::CallIncoming { .. } => "CallIncoming",
            Self::CallOffered { .. } => "CallOffered",
            Self::CallAccepted { .. } => "CallAccepted",
            Self::CallRejected { .. } => "CallRejected",
            Self::CallEnded { .. } => "CallEnded",
            Self::StreamViewersUpdated { .. } => "StreamViewersUpdated",
            Self::BroadcastStarted { .. } => "BroadcastStarted",
            Self::BroadcastStopped { .. } => "BroadcastStopped",
            Self::RosterUpdated { .. } => "RosterUpdated",
            Self::EventCreated { .. } => "EventCreated",
            Self::EventUpdated { .. } => "EventUpdated",
            Self::EventDeleted { .. } => "EventDeleted",
            Self::PollCreated { .. } => "PollCreated",
            Self::PollUpdated { .. } => "PollUpdated",
            Self::PollDeleted { .. } => "PollDeleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacently_tagged() {
        let n = Notification::BroadcastStopped {
            event_id: "e1".into(),
            completed: true,
        };
        let json = serde_json::to_value(&n).unwrap_or_default();
        assert_eq!(json["event"], "BroadcastStopped");
        assert_eq!(json["data"]["event_id"], "e1");
        assert_eq!(json["event"], n.name());
    }
}
