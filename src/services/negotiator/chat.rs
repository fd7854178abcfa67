//! Chat sessions and messages.

use super::SessionNegotiator;
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use crate::state::new_entity_id;
use chrono::{DateTime, Utc};
use huddle_proto::{
    ChatSession, Message, MessageKind, Notification, PairKey, RequestKind, Topic,
};
use std::collections::BTreeMap;
use tracing::info;

impl SessionNegotiator {
    /// Get-or-create the chat for a pair. Creation happens at most once.
    pub(super) async fn ensure_chat(&self, pair: &PairKey) -> CoordResult<ChatSession> {
        let _guard = self.ctx.locks.lock(keys::chat_pair(pair)).await;
        if let Some(chat) = self.ctx.store.find_chat(pair).await? {
            return Ok(chat);
        }

        let chat = ChatSession {
            id: new_entity_id(),
            pair: pair.clone(),
            active: true,
            created_at: self.ctx.now(),
            last_message: None,
        };
        self.ctx.store.insert_chat(&chat).await?;
        info!(chat = %chat.id, pair = %pair, "chat created");

        self.ctx.notifier.publish_all(
            &[Topic::identity(pair.low()), Topic::identity(pair.high())],
            Notification::ChatCreated { chat: chat.clone() },
        );
        Ok(chat)
    }

    /// Idempotent get-or-create. Needs consent: an accepted connection or
    /// an accepted chat request between the pair.
    pub async fn create_chat(&self, actor: &str, peer: &str) -> CoordResult<ChatSession> {
        if actor == peer {
            return Err(CoordError::SelfRequest);
        }
        self.ctx.identity(peer).await?;

        let pair = PairKey::new(actor, peer);
        let consented = self.consent.is_accepted(actor, peer).await?
            || self
                .ctx
                .store
                .has_accepted_request(&pair, RequestKind::Chat)
                .await?;
        if !consented {
            return Err(CoordError::PreconditionFailed(
                "these identities have not consented to chat".into(),
            ));
        }
        self.ensure_chat(&pair).await
    }

    pub async fn list_chats(&self, identity: &str) -> CoordResult<Vec<ChatSession>> {
        Ok(self.ctx.store.list_chats(identity).await?)
    }

    /// A page of messages, newest first.
    pub async fn messages(
        &self,
        chat_id: &str,
        actor: &str,
        before: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> CoordResult<Vec<Message>> {
        self.participant_chat(chat_id, actor).await?;
        Ok(self
            .ctx
            .store
            .list_messages(chat_id, before, self.page_size(limit))
            .await?)
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        actor: &str,
        content: String,
        kind: MessageKind,
    ) -> CoordResult<Message> {
        if content.trim().is_empty() {
            return Err(CoordError::InvalidArgument("message is empty".into()));
        }
        if content.chars().count() > self.config.max_message_len {
            return Err(CoordError::InvalidArgument("message too long".into()));
        }
        self.participant_chat(chat_id, actor).await?;

        // Serializes appends so the preview tracks the latest message.
        let _guard = self.ctx.locks.lock(keys::chat(chat_id)).await;
        let mut chat = self.participant_chat(chat_id, actor).await?;
        if !chat.active {
            return Err(CoordError::InvalidState("chat is closed".into()));
        }

        let message = Message {
            id: new_entity_id(),
            chat_id: chat_id.to_string(),
            sender: actor.to_string(),
            content,
            kind,
            read_by: BTreeMap::new(),
            created_at: self.ctx.now(),
        };
        self.ctx.store.insert_message(&message).await?;
        chat.record_preview(&message);
        self.ctx.store.update_chat(&chat).await?;

        let mut topics = vec![Topic::chat(chat_id)];
        if let Some(other) = chat.pair.other(actor) {
            topics.push(Topic::identity(other));
        }
        self.ctx.notifier.publish_all(
            &topics,
            Notification::MessageCreated {
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Mark every message from the other participant as read by `actor`.
    /// Returns how many messages changed.
    pub async fn mark_read(&self, chat_id: &str, actor: &str) -> CoordResult<usize> {
        let chat = self.participant_chat(chat_id, actor).await?;
        let _guard = self.ctx.locks.lock(keys::chat(chat_id)).await;

        let now = self.ctx.now();
        let unread = self.ctx.store.list_unread(chat_id, actor).await?;
        let count = unread.len();
        for mut message in unread {
            message.read_by.insert(actor.to_string(), now);
            self.ctx.store.update_message(&message).await?;
        }

        if count > 0 {
            let mut topics = vec![Topic::chat(chat_id)];
            if let Some(other) = chat.pair.other(actor) {
                topics.push(Topic::identity(other));
            }
            self.ctx.notifier.publish_all(
                &topics,
                Notification::MessagesRead {
                    chat_id: chat_id.to_string(),
                    reader: actor.to_string(),
                    count,
                    at: now,
                },
            );
        }
        Ok(count)
    }

    /// Ephemeral typing indicator. Nothing is stored.
    pub async fn set_typing(&self, chat_id: &str, actor: &str, typing: bool) -> CoordResult<()> {
        self.participant_chat(chat_id, actor).await?;
        self.ctx.notifier.publish(
            &Topic::chat(chat_id),
            Notification::Typing {
                chat_id: chat_id.to_string(),
                identity_id: actor.to_string(),
                typing,
            },
        );
        Ok(())
    }

    /// Whether `identity` may follow the chat's topic.
    pub async fn can_follow_chat(&self, chat_id: &str, identity: &str) -> CoordResult<bool> {
        Ok(self
            .ctx
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| CoordError::not_found("chat", chat_id))?
            .is_participant(identity))
    }

    async fn participant_chat(&self, chat_id: &str, actor: &str) -> CoordResult<ChatSession> {
        let chat = self
            .ctx
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| CoordError::not_found("chat", chat_id))?;
        if !chat.is_participant(actor) {
            return Err(CoordError::Forbidden("not a participant of this chat".into()));
        }
        Ok(chat)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;
    use chrono::Duration;
    use huddle_proto::RespondAction;

    #[tokio::test]
    async fn create_chat_needs_consent() {
        let f = fixture().await;
        assert!(matches!(
            f.negotiator.create_chat("a", "b").await,
            Err(CoordError::PreconditionFailed(_))
        ));

        let conn = f.consent.request_connection("a", "b").await.unwrap();
        f.consent
            .respond(&conn.id, "b", &RespondAction::Accept)
            .await
            .unwrap();

        let first = f.negotiator.create_chat("a", "b").await.unwrap();
        let second = f.negotiator.create_chat("b", "a").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    async fn chat(f: &super::super::test_support::Fixture) -> ChatSession {
        let req = f
            .negotiator
            .create_request("a", "b", RequestKind::Chat, None)
            .await
            .unwrap();
        f.negotiator
            .respond_request(&req.id, "b", &RespondAction::Accept)
            .await
            .unwrap()
            .chat
            .unwrap()
    }

    #[tokio::test]
    async fn messages_update_preview_and_page_newest_first() {
        let f = fixture().await;
        let chat = chat(&f).await;
        for i in 0..3 {
            f.negotiator
                .send_message(&chat.id, "a", format!("hello {i}"), MessageKind::Text)
                .await
                .unwrap();
            f.clock.advance(Duration::seconds(1));
        }

        let page = f.negotiator.messages(&chat.id, "b", None, Some(2)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "hello 2");

        let chats = f.negotiator.list_chats("b").await.unwrap();
        assert_eq!(
            chats[0].last_message.as_ref().map(|p| p.excerpt.as_str()),
            Some("hello 2")
        );
    }

    #[tokio::test]
    async fn outsiders_and_bad_content_rejected() {
        let f = fixture().await;
        let chat = chat(&f).await;
        assert!(matches!(
            f.negotiator
                .send_message(&chat.id, "c", "hi".into(), MessageKind::Text)
                .await,
            Err(CoordError::Forbidden(_))
        ));
        assert!(matches!(
            f.negotiator
                .send_message(&chat.id, "a", "   ".into(), MessageKind::Text)
                .await,
            Err(CoordError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.negotiator
                .send_message(&chat.id, "a", "x".repeat(4001), MessageKind::Text)
                .await,
            Err(CoordError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.negotiator.messages(&chat.id, "c", None, None).await,
            Err(CoordError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn mark_read_only_touches_the_other_side() {
        let f = fixture().await;
        let chat = chat(&f).await;
        f.negotiator
            .send_message(&chat.id, "a", "one".into(), MessageKind::Text)
            .await
            .unwrap();
        f.negotiator
            .send_message(&chat.id, "a", "two".into(), MessageKind::Text)
            .await
            .unwrap();
        f.negotiator
            .send_message(&chat.id, "b", "three".into(), MessageKind::Text)
            .await
            .unwrap();

        assert_eq!(f.negotiator.mark_read(&chat.id, "b").await.unwrap(), 2);
        assert_eq!(f.negotiator.mark_read(&chat.id, "b").await.unwrap(), 0);
        assert_eq!(f.negotiator.mark_read(&chat.id, "a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn typing_is_published_to_chat_topic() {
        let f = fixture().await;
        let chat = chat(&f).await;
        f.notifier.clear();
        f.negotiator.set_typing(&chat.id, "a", true).await.unwrap();
        assert_eq!(f.notifier.on(&Topic::chat(&chat.id)).len(), 1);
    }
}
