//! Server-to-client frames.

use crate::notification::Notification;
use crate::topic::Topic;
use serde::{Deserialize, Serialize};

/// Machine-readable failure kinds surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidCredential,
    Forbidden,
    NotFound,
    Conflict,
    InvalidState,
    InvalidArgument,
    PreconditionFailed,
    Full,
    UpstreamUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "InvalidCredential",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::InvalidState => "InvalidState",
            Self::InvalidArgument => "InvalidArgument",
            Self::PreconditionFailed => "PreconditionFailed",
            Self::Full => "Full",
            Self::UpstreamUnavailable => "UpstreamUnavailable",
            Self::Internal => "Internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(default)]
    pub id: Option<u64>,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub topic: Topic,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply {
        #[serde(default)]
        id: Option<u64>,
        data: serde_json::Value,
    },
    Error(ErrorFrame),
    Event(EventFrame),
}

impl ServerFrame {
    pub fn reply(id: Option<u64>, data: serde_json::Value) -> Self {
        Self::Reply { id, data }
    }

    pub fn error(
        id: Option<u64>,
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error(ErrorFrame {
            id,
            kind,
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn event(topic: Topic, notification: Notification) -> Self {
        Self::Event(EventFrame {
            topic,
            notification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frame_shape() {
        let frame = ServerFrame::error(Some(3), ErrorKind::Conflict, "conflict", "already pending");
        let json = serde_json::to_value(&frame).unwrap_or_default();
        assert_eq!(json["type"], "error");
        assert_eq!(json["id"], 3);
        assert_eq!(json["kind"], "Conflict");
        assert_eq!(json["code"], "conflict");
    }

    #[test]
    fn event_frame_shape() {
        let frame = ServerFrame::event(
            Topic::Global,
            Notification::EventDeleted {
                event_id: "e9".into(),
            },
        );
        let json = serde_json::to_value(&frame).unwrap_or_default();
        assert_eq!(json["type"], "event");
        assert_eq!(json["topic"]["kind"], "global");
        assert_eq!(json["event"], "EventDeleted");
        assert_eq!(json["data"]["event_id"], "e9");
    }
}
