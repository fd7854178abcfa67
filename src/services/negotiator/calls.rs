//! One-to-one calls and institutional live streams.

use super::{CallJoin, SessionNegotiator};
use crate::auth::RelayRole;
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use crate::state::new_entity_id;
use huddle_proto::{
    CallSession, CallStatus, Notification, PairKey, RequestKind, Topic, call_channel,
    is_valid_channel_name,
};
use std::collections::BTreeSet;
use tracing::{info, warn};

fn relay_account(identity: &str) -> String {
    format!("call_{identity}")
}

impl SessionNegotiator {
    /// Ring `receiver` directly. Requires an accepted chat request between
    /// the pair. A second call for a pair with an open call returns that
    /// call instead of creating another.
    pub async fn initiate_call(
        &self,
        caller: &str,
        receiver: &str,
        broadcast: bool,
    ) -> CoordResult<CallSession> {
        if caller == receiver {
            return Err(CoordError::SelfRequest);
        }
        let caller_identity = self.ctx.identity(caller).await?;
        self.ctx.identity(receiver).await?;
        if broadcast && !caller_identity.is_institutional() {
            return Err(CoordError::Forbidden(
                "only institutional identities may stream".into(),
            ));
        }

        let pair = PairKey::new(caller, receiver);
        if !self
            .ctx
            .store
            .has_accepted_request(&pair, RequestKind::Chat)
            .await?
        {
            return Err(CoordError::PreconditionFailed(
                "no accepted chat request between these identities".into(),
            ));
        }

        let (call, created) = self.open_call(caller, receiver, broadcast).await?;
        if created {
            self.ctx.notifier.publish(
                &Topic::identity(receiver),
                Notification::CallIncoming { call: call.clone() },
            );
        }
        Ok(call)
    }

    /// Lookup-before-create under the pair lock. Returns the open call for
    /// the pair and whether it was created by this call.
    pub(super) async fn open_call(
        &self,
        caller: &str,
        receiver: &str,
        broadcast: bool,
    ) -> CoordResult<(CallSession, bool)> {
        let pair = PairKey::new(caller, receiver);
        let _guard = self.ctx.locks.lock(keys::call_pair(&pair)).await;

        if let Some(mut call) = self.ctx.store.find_open_call(&pair).await? {
            if !is_valid_channel_name(&call.channel) {
                warn!(call = %call.id, channel = %call.channel, "regenerating invalid call channel");
                call.channel = call_channel(&call.id);
                self.ctx.store.update_call(&call).await?;
            }
            return Ok((call, false));
        }

        let id = new_entity_id();
        let call = CallSession {
            channel: call_channel(&id),
            id,
            caller: caller.to_string(),
            receiver: receiver.to_string(),
            status: CallStatus::Pending,
            created_at: self.ctx.now(),
            started_at: None,
            ended_at: None,
            duration_secs: 0,
            broadcast,
            viewers: BTreeSet::new(),
            max_viewers: if broadcast {
                self.config.max_stream_viewers
            } else {
                0
            },
        };
        self.ctx.store.insert_call(&call).await?;
        info!(call = %call.id, caller = %caller, receiver = %receiver, broadcast, "call created");
        Ok((call, true))
    }

    /// Receiver picks up. Both participants get their own publisher token;
    /// the caller's travels in the acceptance notification.
    pub async fn accept_call(&self, call_id: &str, actor: &str) -> CoordResult<CallJoin> {
        let existing = self.load_call(call_id).await?;
        if existing.receiver != actor {
            return Err(CoordError::Forbidden("only the receiver may accept".into()));
        }

        let _guard = self.ctx.locks.lock(keys::call_pair(&existing.pair())).await;
        let mut call = self.load_call(call_id).await?;
        if call.status != CallStatus::Pending {
            return Err(CoordError::InvalidState(format!(
                "call is {}",
                call.status.as_str()
            )));
        }

        let caller_token = self.mint(&call.channel, &call.caller, RelayRole::Publisher)?;
        let receiver_token = self.mint(&call.channel, &call.receiver, RelayRole::Publisher)?;

        call.status = CallStatus::Accepted;
        call.started_at = Some(self.ctx.now());
        self.ctx.store.update_call(&call).await?;
        info!(call = %call.id, "call accepted");

        let app_id = self.issuer.relay_app_id().to_string();
        self.ctx.notifier.publish(
            &Topic::identity(&call.caller),
            Notification::CallAccepted {
                call: call.clone(),
                app_id: app_id.clone(),
                relay_token: caller_token,
            },
        );
        Ok(CallJoin {
            channel: call.channel.clone(),
            call,
            app_id,
            relay_token: receiver_token,
        })
    }

    pub async fn reject_call(&self, call_id: &str, actor: &str) -> CoordResult<CallSession> {
        let existing = self.load_call(call_id).await?;
        if existing.receiver != actor {
            return Err(CoordError::Forbidden("only the receiver may reject".into()));
        }

        let _guard = self.ctx.locks.lock(keys::call_pair(&existing.pair())).await;
        let mut call = self.load_call(call_id).await?;
        if call.status != CallStatus::Pending {
            return Err(CoordError::InvalidState(format!(
                "call is {}",
                call.status.as_str()
            )));
        }
        call.finish(CallStatus::Rejected, self.ctx.now());
        self.ctx.store.update_call(&call).await?;
        info!(call = %call.id, "call rejected");

        self.ctx.notifier.publish_all(
            &[Topic::identity(&call.caller), Topic::call(&call.id)],
            Notification::CallRejected { call: call.clone() },
        );
        Ok(call)
    }

    /// Either participant hangs up. Allowed while pending (caller cancel).
    pub async fn end_call(&self, call_id: &str, actor: &str) -> CoordResult<CallSession> {
        let existing = self.load_call(call_id).await?;
        let Some(other) = existing.peer_of(actor).map(str::to_string) else {
            return Err(CoordError::Forbidden("not a participant of this call".into()));
        };

        let _guard = self.ctx.locks.lock(keys::call_pair(&existing.pair())).await;
        let mut call = self.load_call(call_id).await?;
        if call.status.is_terminal() {
            return Err(CoordError::InvalidState(format!(
                "call is already {}",
                call.status.as_str()
            )));
        }
        call.finish(CallStatus::Ended, self.ctx.now());
        self.ctx.store.update_call(&call).await?;
        info!(call = %call.id, by = %actor, duration_secs = call.duration_secs, "call ended");

        self.ctx.notifier.publish_all(
            &[Topic::identity(&other), Topic::call(&call.id)],
            Notification::CallEnded { call: call.clone() },
        );
        Ok(call)
    }

    pub async fn call_history(
        &self,
        identity: &str,
        limit: Option<u32>,
    ) -> CoordResult<Vec<CallSession>> {
        Ok(self
            .ctx
            .store
            .list_calls(identity, self.page_size(limit))
            .await?)
    }

    /// Pull-style recovery for clients that missed call notifications.
    pub async fn active_call_with(
        &self,
        identity: &str,
        peer: &str,
    ) -> CoordResult<Option<CallSession>> {
        Ok(self
            .ctx
            .store
            .find_open_call(&PairKey::new(identity, peer))
            .await?)
    }

    /// Join an accepted institutional stream as a read-only viewer.
    pub async fn join_live_stream(&self, call_id: &str, viewer: &str) -> CoordResult<CallJoin> {
        let existing = self.load_call(call_id).await?;
        if existing.is_participant(viewer) {
            return Err(CoordError::InvalidArgument(
                "participants do not join as viewers".into(),
            ));
        }

        let _guard = self.ctx.locks.lock(keys::call_pair(&existing.pair())).await;
        let mut call = self.load_call(call_id).await?;
        ensure_streaming(&call)?;

        let token = self.mint(&call.channel, viewer, RelayRole::Subscriber)?;
        if !call.viewers.contains(viewer) {
            if call.viewers.len() >= call.max_viewers as usize {
                return Err(CoordError::Full("live stream".into()));
            }
            call.viewers.insert(viewer.to_string());
            self.ctx.store.update_call(&call).await?;
            self.push_viewers(&call);
        }

        Ok(CallJoin {
            channel: call.channel.clone(),
            app_id: self.issuer.relay_app_id().to_string(),
            call,
            relay_token: token,
        })
    }

    pub async fn leave_live_stream(&self, call_id: &str, viewer: &str) -> CoordResult<CallSession> {
        let existing = self.load_call(call_id).await?;
        let _guard = self.ctx.locks.lock(keys::call_pair(&existing.pair())).await;
        let mut call = self.load_call(call_id).await?;
        ensure_streaming(&call)?;

        if call.viewers.remove(viewer) {
            self.ctx.store.update_call(&call).await?;
            self.push_viewers(&call);
        }
        Ok(call)
    }

    /// Whether `identity` may follow the call's topic.
    pub async fn can_follow_call(&self, call_id: &str, identity: &str) -> CoordResult<bool> {
        let call = self.load_call(call_id).await?;
        Ok(call.is_participant(identity) || call.viewers.contains(identity))
    }

    fn push_viewers(&self, call: &CallSession) {
        let viewers: Vec<String> = call.viewers.iter().cloned().collect();
        self.ctx.notifier.publish_all(
            &[
                Topic::call(&call.id),
                Topic::identity(&call.caller),
                Topic::identity(&call.receiver),
            ],
            Notification::StreamViewersUpdated {
                call_id: call.id.clone(),
                count: viewers.len(),
                viewers,
            },
        );
    }

    fn mint(&self, channel: &str, identity: &str, role: RelayRole) -> CoordResult<String> {
        Ok(self.issuer.mint_relay_token(
            channel,
            &relay_account(identity),
            role,
            self.relay_ttl_secs,
        )?)
    }

    async fn load_call(&self, id: &str) -> CoordResult<CallSession> {
        self.ctx
            .store
            .get_call(id)
            .await?
            .ok_or_else(|| CoordError::not_found("call", id))
    }
}

fn ensure_streaming(call: &CallSession) -> CoordResult<()> {
    if !call.broadcast || call.status != CallStatus::Accepted {
        return Err(CoordError::InvalidState(
            "call is not a live stream".into(),
        ));
    }
    Ok(())
}
