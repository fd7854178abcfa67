//! Client command frames.
//!
//! A client frame is a JSON object carrying an optional correlation `id`
//! and a `type` naming the command; the remaining fields are the
//! command's arguments.

use crate::model::{EventDraft, EventPatch, MessageKind, RequestKind};
use crate::topic::Topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// Accept/reject answer to a connection or session request.
///
/// Unknown actions are kept rather than rejected at parse time so the
/// coordinator can report them as an invalid state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RespondAction {
    Accept,
    Reject,
    Other(String),
}

impl From<String> for RespondAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "accept" => Self::Accept,
            "reject" => Self::Reject,
            _ => Self::Other(s),
        }
    }
}

impl From<RespondAction> for String {
    fn from(action: RespondAction) -> Self {
        match action {
            RespondAction::Accept => "accept".to_string(),
            RespondAction::Reject => "reject".to_string(),
            RespondAction::Other(s) => s,
        }
    }
}

/// Role requested for an event relay token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayRequestRole {
    Host,
    Audience,
}

impl RelayRequestRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Audience => "audience",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventFilter {
    #[default]
    All,
    Upcoming,
    Live,
    Hosted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    // Session
    Authenticate {
        token: String,
    },
    Ping,
    Subscribe {
        topic: Topic,
    },
    Unsubscribe {
        topic: Topic,
    },

    // Consent
    RequestConnection {
        peer: String,
    },
    RespondConnection {
        connection_id: String,
        action: RespondAction,
    },
    GetConnectionStatus {
        peer: String,
    },
    ListConnections,

    // Requests and chats
    CreateSessionRequest {
        receiver: String,
        kind: RequestKind,
        #[serde(default)]
        message: Option<String>,
    },
    RespondSessionRequest {
        request_id: String,
        action: RespondAction,
    },
    ListSessionRequests {
        #[serde(default)]
        kind: Option<RequestKind>,
    },
    CreateChat {
        peer: String,
    },
    ListChats,
    GetMessages {
        chat_id: String,
        #[serde(default)]
        before: Option<DateTime<Utc>>,
        #[serde(default)]
        limit: Option<u32>,
    },
    SendMessage {
        chat_id: String,
        content: String,
        #[serde(default)]
        kind: MessageKind,
    },
    MarkRead {
        chat_id: String,
    },
    SetTyping {
        chat_id: String,
        typing: bool,
    },

    // Calls
    InitiateCall {
        receiver: String,
        #[serde(default)]
        broadcast: bool,
    },
    AcceptCall {
        call_id: String,
    },
    RejectCall {
        call_id: String,
    },
    EndCall {
        call_id: String,
    },
    GetCallHistory {
        #[serde(default)]
        limit: Option<u32>,
    },
    GetActiveCallWithPeer {
        peer: String,
    },
    JoinLiveStream {
        call_id: String,
    },
    LeaveLiveStream {
        call_id: String,
    },

    // Broadcasts
    StartBroadcast {
        event_id: String,
    },
    StopBroadcast {
        event_id: String,
    },
    ExtendBroadcast {
        event_id: String,
        minutes: i64,
    },
    GetRelayToken {
        event_id: String,
        role: RelayRequestRole,
        #[serde(default)]
        session_tag: Option<String>,
    },
    GetAnonymousRelayToken {
        event_id: String,
        #[serde(default)]
        session_tag: Option<String>,
    },
    CreateEvent {
        event: EventDraft,
    },
    UpdateEvent {
        event_id: String,
        patch: EventPatch,
    },
    DeleteEvent {
        event_id: String,
    },
    JoinEvent {
        event_id: String,
    },
    ListEvents {
        #[serde(default)]
        filter: EventFilter,
    },
    JoinViewerRoster {
        event_id: String,
    },
    LeaveViewerRoster {
        event_id: String,
    },
    GetRoster {
        event_id: String,
    },

    // Polls
    CreatePoll {
        event_id: String,
        question: String,
        options: Vec<String>,
    },
    ListPolls {
        event_id: String,
    },
    Vote {
        poll_id: String,
        option_index: usize,
    },
    ClosePoll {
        poll_id: String,
    },
}

impl ClientCommand {
    /// Command name, used for tracing spans and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Ping => "ping",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::RequestConnection { .. } => "request_connection",
            Self::RespondConnection { .. } => "respond_connection",
            Self::GetConnectionStatus { .. } => "get_connection_status",
            Self::ListConnections => "list_connections",
            Self::CreateSessionRequest { .. } => "create_session_request",
            Self::RespondSessionRequest { .. } => "respond_session_request",
            Self::ListSessionRequests { .. } => "list_session_requests",
            Self::CreateChat { .. } => "create_chat",
            Self::ListChats => "list_chats",
            Self::GetMessages { .. } => "get_messages",
            Self::SendMessage { .. } => "send_message",
            Self::MarkRead { .. } => "mark_read",
            Self::SetTyping { .. } => "set_typing",
            Self::InitiateCall { .. } => "initiate_call",
            Self::AcceptCall { .. } => "accept_call",
            Self::RejectCall { .. } => "reject_call",
            Self::EndCall { .. } => "end_call",
            Self::GetCallHistory { .. } => "get_call_history",
            Self::GetActiveCallWithPeer { .. } => "get_active_call_with_peer",
            Self::JoinLiveStream { .. } => "join_live_stream",
            Self::LeaveLiveStream { .. } => "leave_live_stream",
            Self::StartBroadcast { .. } => "start_broadcast",
            Self::StopBroadcast { .. } => "stop_broadcast",
            Self::ExtendBroadcast { .. } => "extend_broadcast",
            Self::GetRelayToken { .. } => "get_relay_token",
            Self::GetAnonymousRelayToken { .. } => "get_anonymous_relay_token",
            Self::CreateEvent { .. } => "create_event",
            Self::UpdateEvent { .. } => "update_event",
            Self::DeleteEvent { .. } => "delete_event",
            Self::JoinEvent { .. } => "join_event",
            Self::ListEvents { .. } => "list_events",
            Self::JoinViewerRoster { .. } => "join_viewer_roster",
            Self::LeaveViewerRoster { .. } => "leave_viewer_roster",
            Self::GetRoster { .. } => "get_roster",
            Self::CreatePoll { .. } => "create_poll",
            Self::ListPolls { .. } => "list_polls",
            Self::Vote { .. } => "vote",
            Self::ClosePoll { .. } => "close_poll",
        }
    }

    /// Commands accepted before the connection is bound to an identity.
    pub fn allowed_before_auth(&self) -> bool {
        matches!(
            self,
            Self::Authenticate { .. } | Self::Ping | Self::GetAnonymousRelayToken { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_frame() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"id": 7, "type": "respond_connection", "connection_id": "c1", "action": "accept"}"#,
        )
        .unwrap();
        assert_eq!(frame.id, Some(7));
        assert_eq!(
            frame.command,
            ClientCommand::RespondConnection {
                connection_id: "c1".into(),
                action: RespondAction::Accept,
            }
        );
    }

    #[test]
    fn unknown_action_survives_parsing() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type": "respond_session_request", "request_id": "r", "action": "maybe"}"#,
        )
        .unwrap();
        assert!(matches!(
            frame.command,
            ClientCommand::RespondSessionRequest { action: RespondAction::Other(ref s), .. } if s == "maybe"
        ));
    }

    #[test]
    fn unit_commands_and_defaults() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(frame.command, ClientCommand::Ping);
        assert!(frame.command.allowed_before_auth());

        let frame: ClientFrame =
            serde_json::from_str(r#"{"type": "list_events"}"#).unwrap();
        assert_eq!(
            frame.command,
            ClientCommand::ListEvents {
                filter: EventFilter::All
            }
        );
        assert!(!frame.command.allowed_before_auth());
    }
}
