use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub votes: u64,
}

/// A poll attached to a live event.
///
/// The voter set is storage-only. Anything leaving the coordinator goes
/// through [`Poll::view`], which drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub event_id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub voters: BTreeSet<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Sanitized poll, safe to return or broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollView {
    pub id: String,
    pub event_id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub total_votes: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn has_voted(&self, identity: &str) -> bool {
        self.voters.contains(identity)
    }

    pub fn view(&self) -> PollView {
        PollView {
            id: self.id.clone(),
            event_id: self.event_id.clone(),
            question: self.question.clone(),
            options: self.options.clone(),
            total_votes: self.options.iter().map(|o| o.votes).sum(),
            active: self.active,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_never_carries_voters() {
        let poll = Poll {
            id: "p".into(),
            event_id: "e".into(),
            question: "?".into(),
            options: vec![
                PollOption { text: "a".into(), votes: 2 },
                PollOption { text: "b".into(), votes: 1 },
            ],
            voters: ["v1", "v2", "v3"].iter().map(|s| s.to_string()).collect(),
            active: true,
            created_at: Utc::now(),
        };
        let view = poll.view();
        assert_eq!(view.total_votes, 3);
        let json = serde_json::to_string(&view).unwrap_or_default();
        assert!(!json.contains("voters"));
        assert!(!json.contains("v1"));
    }
}
