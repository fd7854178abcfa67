use super::PairKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Accepted,
    Rejected,
    Ended,
    Missed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Ended => "ended",
            Self::Missed => "missed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "ended" => Some(Self::Ended),
            "missed" => Some(Self::Missed),
            _ => None,
        }
    }

    /// Pending and accepted calls are open; everything else is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Accepted)
    }
}

/// A one-to-one call, optionally broadcast to live-stream viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: String,
    pub caller: String,
    pub receiver: String,
    pub status: CallStatus,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds between start and end; zero if the call never started.
    #[serde(default)]
    pub duration_secs: i64,
    #[serde(default)]
    pub broadcast: bool,
    #[serde(default)]
    pub viewers: BTreeSet<String>,
    #[serde(default)]
    pub max_viewers: u32,
}

impl CallSession {
    pub fn pair(&self) -> PairKey {
        PairKey::new(&self.caller, &self.receiver)
    }

    pub fn is_participant(&self, identity: &str) -> bool {
        self.caller == identity || self.receiver == identity
    }

    /// The participant on the other side of `identity`.
    pub fn peer_of(&self, identity: &str) -> Option<&str> {
        if self.caller == identity {
            Some(&self.receiver)
        } else if self.receiver == identity {
            Some(&self.caller)
        } else {
            None
        }
    }

    /// Close the call at `now`, computing its duration.
    pub fn finish(&mut self, status: CallStatus, now: DateTime<Utc>) {
        self.status = status;
        self.ended_at = Some(now);
        self.duration_secs = self
            .started_at
            .map(|start| (now - start).num_seconds().max(0))
            .unwrap_or(0);
        self.viewers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn call() -> CallSession {
        CallSession {
            id: "c1".into(),
            caller: "a".into(),
            receiver: "b".into(),
            status: CallStatus::Pending,
            channel: "call_c1".into(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            duration_secs: 0,
            broadcast: false,
            viewers: BTreeSet::new(),
            max_viewers: 0,
        }
    }

    #[test]
    fn finish_without_start_has_zero_duration() {
        let mut c = call();
        c.finish(CallStatus::Ended, Utc::now());
        assert_eq!(c.duration_secs, 0);
        assert!(c.status.is_terminal());
    }

    #[test]
    fn finish_computes_duration() {
        let mut c = call();
        let start = Utc::now();
        c.started_at = Some(start);
        c.status = CallStatus::Accepted;
        c.finish(CallStatus::Ended, start + Duration::seconds(95));
        assert_eq!(c.duration_secs, 95);
    }

    #[test]
    fn open_states_are_not_terminal() {
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::Accepted.is_terminal());
        assert!(CallStatus::Missed.is_terminal());
    }
}
