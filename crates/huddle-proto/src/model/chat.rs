use super::PairKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum characters kept in a chat's last-message preview.
pub const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

/// A one-to-one chat between the two members of `pair`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub pair: PairKey,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessagePreview>,
}

/// Denormalized summary of the newest message in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub sender: String,
    pub kind: MessageKind,
    pub excerpt: String,
    pub at: DateTime<Utc>,
}

impl ChatSession {
    pub fn is_participant(&self, identity: &str) -> bool {
        self.pair.contains(identity)
    }

    /// Update the preview from a freshly appended message.
    pub fn record_preview(&mut self, message: &Message) {
        let excerpt: String = match message.kind {
            MessageKind::Text => message.content.chars().take(PREVIEW_CHARS).collect(),
            MessageKind::Image => "[image]".to_string(),
            MessageKind::File => "[file]".to_string(),
        };
        self.last_message = Some(MessagePreview {
            sender: message.sender.clone(),
            kind: message.kind,
            excerpt,
            at: message.created_at,
        });
    }
}

/// A message appended to a chat. Immutable apart from read markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
    /// Reader identity -> time the reader marked it read.
    #[serde(default)]
    pub read_by: BTreeMap<String, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_text_and_masks_attachments() {
        let now = Utc::now();
        let mut chat = ChatSession {
            id: "c".into(),
            pair: PairKey::new("a", "b"),
            active: true,
            created_at: now,
            last_message: None,
        };
        let mut msg = Message {
            id: "m".into(),
            chat_id: "c".into(),
            sender: "a".into(),
            content: "x".repeat(500),
            kind: MessageKind::Text,
            read_by: BTreeMap::new(),
            created_at: now,
        };
        chat.record_preview(&msg);
        assert_eq!(
            chat.last_message.as_ref().map(|p| p.excerpt.chars().count()),
            Some(PREVIEW_CHARS)
        );

        msg.kind = MessageKind::Image;
        chat.record_preview(&msg);
        assert_eq!(
            chat.last_message.map(|p| p.excerpt),
            Some("[image]".to_string())
        );
    }
}
