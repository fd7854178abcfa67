//! Session requests: create, respond, expire.

use super::{RequestOutcome, SessionNegotiator};
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use crate::state::new_entity_id;
use chrono::{DateTime, Utc};
use huddle_proto::{
    CallSession, CallStatus, Notification, PairKey, RequestKind, RequestStatus, RespondAction,
    SessionRequest, Topic, call_channel,
};
use std::collections::BTreeSet;
use tracing::info;

impl SessionNegotiator {
    /// Propose a chat or call to `receiver`.
    pub async fn create_request(
        &self,
        sender: &str,
        receiver: &str,
        kind: RequestKind,
        message: Option<String>,
    ) -> CoordResult<SessionRequest> {
        if sender == receiver {
            return Err(CoordError::SelfRequest);
        }
        if let Some(text) = &message
            && text.chars().count() > self.config.max_message_len
        {
            return Err(CoordError::InvalidArgument("message too long".into()));
        }
        self.ctx.identity(receiver).await?;
        self.limiter.check(sender)?;

        let pair = PairKey::new(sender, receiver);
        let _guard = self.ctx.locks.lock(keys::request_pair(kind, &pair)).await;
        let now = self.ctx.now();

        if let Some(existing) = self.ctx.store.find_pending_request(&pair, kind).await? {
            if existing.is_live(now) {
                return Err(CoordError::Conflict(format!(
                    "a {} request is already pending",
                    kind.as_str()
                )));
            }
            // Stale row still holds the pending slot.
            self.expire(existing, now).await?;
        }

        if kind == RequestKind::Chat && self.ctx.store.find_chat(&pair).await?.is_some() {
            return Err(CoordError::Conflict("a chat already exists".into()));
        }

        let request = SessionRequest {
            id: new_entity_id(),
            kind,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            status: RequestStatus::Pending,
            message,
            created_at: now,
            expires_at: now + self.request_ttl(kind),
            responded_at: None,
        };
        self.ctx.store.insert_request(&request).await?;

        info!(request = %request.id, from = %sender, to = %receiver, kind = kind.as_str(), "session requested");
        self.ctx.notifier.publish_all(
            &[Topic::identity(receiver), Topic::identity(sender)],
            Notification::SessionRequested {
                request: request.clone(),
            },
        );
        Ok(request)
    }

    /// Receiver's answer to a pending request. Accepting materializes the
    /// session idempotently.
    pub async fn respond_request(
        &self,
        request_id: &str,
        actor: &str,
        action: &RespondAction,
    ) -> CoordResult<RequestOutcome> {
        let existing = self.load_request(request_id).await?;
        if existing.receiver != actor {
            return Err(CoordError::Forbidden(
                "only the receiver may respond".into(),
            ));
        }

        let pair = existing.pair();
        let _guard = self
            .ctx
            .locks
            .lock(keys::request_pair(existing.kind, &pair))
            .await;
        let mut request = self.load_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(CoordError::InvalidState(format!(
                "request is already {}",
                request.status.as_str()
            )));
        }
        let now = self.ctx.now();
        if request.is_stale(now) {
            self.expire(request, now).await?;
            return Err(CoordError::InvalidState("request has expired".into()));
        }

        let status = match action {
            RespondAction::Accept => RequestStatus::Accepted,
            RespondAction::Reject => RequestStatus::Rejected,
            RespondAction::Other(other) => {
                return Err(CoordError::InvalidState(format!(
                    "unsupported action {other:?}"
                )));
            }
        };
        // The session exists before the request reads as accepted. Both
        // steps are idempotent, so a failed answer can simply be retried.
        let mut chat = None;
        let mut offered = None;
        if status == RequestStatus::Accepted {
            match request.kind {
                RequestKind::Chat => chat = Some(self.ensure_chat(&pair).await?),
                RequestKind::Call => {
                    offered = Some(
                        self.open_call(&request.sender, &request.receiver, false)
                            .await?,
                    );
                }
            }
        }

        request.status = status;
        request.responded_at = Some(now);
        self.ctx.store.update_request(&request).await?;
        info!(request = %request.id, status = status.as_str(), "session request answered");

        self.ctx.notifier.publish_all(
            &[
                Topic::identity(&request.sender),
                Topic::identity(&request.receiver),
            ],
            Notification::SessionRequestUpdated {
                request: request.clone(),
            },
        );
        if let Some((call, true)) = &offered {
            self.ctx.notifier.publish(
                &Topic::identity(&request.sender),
                Notification::CallOffered { call: call.clone() },
            );
        }

        Ok(RequestOutcome {
            request,
            chat,
            call: offered.map(|(call, _)| call),
        })
    }

    pub async fn list_requests(
        &self,
        identity: &str,
        kind: Option<RequestKind>,
    ) -> CoordResult<Vec<SessionRequest>> {
        Ok(self.ctx.store.list_requests(identity, kind).await?)
    }

    /// Expire every pending request past its deadline. Returns the number
    /// of requests expired.
    pub async fn expire_due_requests(&self, now: DateTime<Utc>) -> CoordResult<usize> {
        let due = self.ctx.store.list_due_requests(now).await?;
        let mut expired = 0;
        for candidate in due {
            let _guard = self
                .ctx
                .locks
                .lock(keys::request_pair(candidate.kind, &candidate.pair()))
                .await;
            // Re-check: the receiver may have answered since the scan.
            let Some(request) = self.ctx.store.get_request(&candidate.id).await? else {
                continue;
            };
            if !request.is_stale(now) {
                continue;
            }
            self.expire(request, now).await?;
            expired += 1;
        }
        Ok(expired)
    }

    /// Mark a stale request expired and tell the sender. Call requests
    /// leave a missed call in the history. Caller holds the pair lock.
    async fn expire(&self, mut request: SessionRequest, now: DateTime<Utc>) -> CoordResult<()> {
        request.status = RequestStatus::Expired;
        request.responded_at = Some(now);
        self.ctx.store.update_request(&request).await?;
        info!(request = %request.id, kind = request.kind.as_str(), "session request expired");

        if request.kind == RequestKind::Call {
            let id = new_entity_id();
            let missed = CallSession {
                channel: call_channel(&id),
                id,
                caller: request.sender.clone(),
                receiver: request.receiver.clone(),
                status: CallStatus::Missed,
                created_at: request.created_at,
                started_at: None,
                ended_at: Some(now),
                duration_secs: 0,
                broadcast: false,
                viewers: BTreeSet::new(),
                max_viewers: 0,
            };
            self.ctx.store.insert_call(&missed).await?;
        }

        self.ctx.notifier.publish(
            &Topic::identity(&request.sender),
            Notification::SessionRequestUpdated { request },
        );
        Ok(())
    }

    async fn load_request(&self, id: &str) -> CoordResult<SessionRequest> {
        self.ctx
            .store
            .get_request(id)
            .await?
            .ok_or_else(|| CoordError::not_found("session request", id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;
    use crate::clock::Clock;
    use crate::db::Store;
    use chrono::Duration;

    #[tokio::test]
    async fn second_pending_request_conflicts_from_either_side() {
        let f = fixture().await;
        let n = &f.negotiator;
        n.create_request("a", "b", RequestKind::Chat, None).await.unwrap();
        assert!(matches!(
            n.create_request("b", "a", RequestKind::Chat, None).await,
            Err(CoordError::Conflict(_))
        ));
        // Other kind is independent.
        n.create_request("a", "b", RequestKind::Call, None).await.unwrap();
    }

    #[tokio::test]
    async fn create_validates_parties() {
        let f = fixture().await;
        let n = &f.negotiator;
        assert_eq!(
            n.create_request("a", "a", RequestKind::Chat, None).await,
            Err(CoordError::SelfRequest)
        );
        assert!(matches!(
            n.create_request("a", "ghost", RequestKind::Chat, None).await,
            Err(CoordError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn accepting_twice_creates_one_chat() {
        let f = fixture().await;
        let n = &f.negotiator;
        let req = n.create_request("a", "b", RequestKind::Chat, None).await.unwrap();

        let outcome = n.respond_request(&req.id, "b", &RespondAction::Accept).await.unwrap();
        assert_eq!(outcome.request.status, RequestStatus::Accepted);
        let chat = outcome.chat.unwrap();
        assert!(chat.is_participant("a") && chat.is_participant("b"));

        assert!(matches!(
            n.respond_request(&req.id, "b", &RespondAction::Accept).await,
            Err(CoordError::InvalidState(_))
        ));
        assert_eq!(f.store.list_chats("a").await.unwrap().len(), 1);
        assert!(
            f.store
                .list_messages(&chat.id, None, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn only_receiver_responds() {
        let f = fixture().await;
        let req = f
            .negotiator
            .create_request("a", "b", RequestKind::Chat, None)
            .await
            .unwrap();
        assert!(matches!(
            f.negotiator
                .respond_request(&req.id, "a", &RespondAction::Accept)
                .await,
            Err(CoordError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn chat_request_conflicts_with_existing_chat() {
        let f = fixture().await;
        let n = &f.negotiator;
        let req = n.create_request("a", "b", RequestKind::Chat, None).await.unwrap();
        n.respond_request(&req.id, "b", &RespondAction::Accept).await.unwrap();
        assert!(matches!(
            n.create_request("b", "a", RequestKind::Chat, None).await,
            Err(CoordError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn stale_request_frees_the_slot() {
        let f = fixture().await;
        let n = &f.negotiator;
        let first = n.create_request("a", "b", RequestKind::Call, None).await.unwrap();
        f.clock.advance(Duration::seconds(301));

        assert!(matches!(
            n.respond_request(&first.id, "b", &RespondAction::Accept).await,
            Err(CoordError::InvalidState(_))
        ));
        let stored = f.store.get_request(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Expired);

        n.create_request("a", "b", RequestKind::Call, None).await.unwrap();
        let history = f.store.list_calls("a", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallStatus::Missed);
    }

    #[tokio::test]
    async fn expiry_sweep_notifies_sender() {
        let f = fixture().await;
        let n = &f.negotiator;
        n.create_request("a", "b", RequestKind::Chat, None).await.unwrap();
        n.create_request("a", "c", RequestKind::Call, None).await.unwrap();
        f.notifier.clear();

        f.clock.advance(Duration::seconds(301));
        assert_eq!(n.expire_due_requests(f.clock.now()).await.unwrap(), 1);
        assert_eq!(f.notifier.on(&Topic::identity("a")).len(), 1);

        f.clock.advance(Duration::days(7));
        assert_eq!(n.expire_due_requests(f.clock.now()).await.unwrap(), 1);
        assert_eq!(
            n.expire_due_requests(f.clock.now()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn accepted_call_request_offers_call_to_sender() {
        let f = fixture().await;
        let n = &f.negotiator;
        let req = n.create_request("a", "b", RequestKind::Call, None).await.unwrap();
        f.notifier.clear();
        let outcome = n.respond_request(&req.id, "b", &RespondAction::Accept).await.unwrap();
        let call = outcome.call.unwrap();
        assert_eq!(call.caller, "a");
        assert_eq!(call.status, CallStatus::Pending);
        assert!(huddle_proto::is_valid_channel_name(&call.channel));
        assert!(
            f.notifier
                .on(&Topic::identity("a"))
                .iter()
                .any(|n| n.name() == "CallOffered")
        );
    }

    #[tokio::test]
    async fn failed_session_creation_leaves_request_pending() {
        let f = fixture().await;
        let n = &f.negotiator;
        let chat_req = n.create_request("a", "b", RequestKind::Chat, None).await.unwrap();
        let call_req = n.create_request("a", "c", RequestKind::Call, None).await.unwrap();
        f.store.fail_inserts_into("chat");
        f.store.fail_inserts_into("call");
        f.notifier.clear();

        for (id, receiver) in [(&chat_req.id, "b"), (&call_req.id, "c")] {
            assert_eq!(
                n.respond_request(id, receiver, &RespondAction::Accept).await,
                Err(CoordError::Internal)
            );
            let stored = f.store.get_request(id).await.unwrap().unwrap();
            assert_eq!(stored.status, RequestStatus::Pending);
        }
        assert!(f.notifier.names().is_empty());
        assert!(f.store.list_chats("a").await.unwrap().is_empty());
        assert!(f.store.list_calls("a", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejecting_creates_nothing() {
        let f = fixture().await;
        let n = &f.negotiator;
        let req = n.create_request("a", "b", RequestKind::Chat, None).await.unwrap();
        let outcome = n.respond_request(&req.id, "b", &RespondAction::Reject).await.unwrap();
        assert_eq!(outcome.request.status, RequestStatus::Rejected);
        assert!(outcome.chat.is_none());
        assert!(f.store.list_chats("a").await.unwrap().is_empty());
    }
}
