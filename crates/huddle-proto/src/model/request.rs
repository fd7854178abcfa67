use super::PairKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a session request proposes to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Chat,
    Call,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Call => "call",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(Self::Chat),
            "call" => Some(Self::Call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A proposal to open a chat or call, awaiting the receiver's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: String,
    pub kind: RequestKind,
    pub sender: String,
    pub receiver: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl SessionRequest {
    pub fn pair(&self) -> PairKey {
        PairKey::new(&self.sender, &self.receiver)
    }

    /// Pending and not yet past its expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && self.expires_at > now
    }

    /// Pending but past its expiry; treated as absent by every query.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && self.expires_at <= now
    }
}
