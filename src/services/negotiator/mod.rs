//! Session negotiator.
//!
//! Drives the two request-to-session state machines:
//!
//! ```text
//! request:  none -> pending -> {accepted, rejected, expired}
//! chat:     accepted request -> active chat (created exactly once per pair)
//! call:     pending -> {accepted -> ended, rejected, ended, missed}
//! ```
//!
//! Uniqueness is per unordered pair. Every read-check-then-write runs under
//! the pair's keyed lock, and the store's unique indexes back that up.

mod calls;
mod chat;
mod requests;

use super::{ConsentGate, RequestLimiter, ServiceContext};
use crate::auth::CredentialIssuer;
use crate::config::SessionsConfig;
use chrono::Duration;
use huddle_proto::{CallSession, ChatSession, RequestKind, SessionRequest};
use serde::Serialize;
use std::sync::Arc;

/// Result of responding to a session request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub request: SessionRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallSession>,
}

/// Media credentials handed to one call participant or viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallJoin {
    pub call: CallSession,
    pub app_id: String,
    pub channel: String,
    pub relay_token: String,
}

pub struct SessionNegotiator {
    ctx: ServiceContext,
    consent: Arc<ConsentGate>,
    limiter: Arc<RequestLimiter>,
    issuer: Arc<dyn CredentialIssuer>,
    config: SessionsConfig,
    relay_ttl_secs: u64,
}

impl SessionNegotiator {
    pub fn new(
        ctx: ServiceContext,
        consent: Arc<ConsentGate>,
        limiter: Arc<RequestLimiter>,
        issuer: Arc<dyn CredentialIssuer>,
        config: SessionsConfig,
        relay_ttl_secs: u64,
    ) -> Self {
        Self {
            ctx,
            consent,
            limiter,
            issuer,
            config,
            relay_ttl_secs,
        }
    }

    fn request_ttl(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Chat => Duration::seconds(self.config.chat_request_ttl_secs),
            RequestKind::Call => Duration::seconds(self.config.call_request_ttl_secs),
        }
    }

    /// Clamp a requested page size to `1..=history_page_size`.
    fn page_size(&self, limit: Option<u32>) -> u32 {
        let max = self.config.history_page_size.max(1);
        limit.unwrap_or(max).clamp(1, max)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::HmacIssuer;
    use crate::clock::ManualClock;
    use crate::db::{MemoryStore, Store};
    use crate::notify::RecordingNotifier;
    use crate::state::KeyedLocks;
    use chrono::{TimeZone, Utc};
    use huddle_proto::{Identity, IdentityKind};

    pub struct Fixture {
        pub negotiator: SessionNegotiator,
        pub consent: Arc<ConsentGate>,
        pub notifier: Arc<RecordingNotifier>,
        pub clock: Arc<ManualClock>,
        pub store: Arc<MemoryStore>,
        pub issuer: Arc<HmacIssuer>,
    }

    pub async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for (id, kind) in [
            ("a", IdentityKind::Individual),
            ("b", IdentityKind::Individual),
            ("c", IdentityKind::Individual),
            ("inst", IdentityKind::Institutional),
        ] {
            store
                .upsert_identity(&Identity {
                    id: id.into(),
                    display_name: id.into(),
                    kind,
                    email: None,
                })
                .await
                .unwrap();
        }
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(RecordingNotifier::new());
        let ctx = ServiceContext {
            store: store.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
            locks: Arc::new(KeyedLocks::new()),
        };
        let limiter = Arc::new(RequestLimiter::new(100));
        let consent = Arc::new(ConsentGate::new(ctx.clone(), limiter.clone()));
        let issuer = Arc::new(HmacIssuer::new(
            "identity-secret-for-tests",
            "relay-secret-for-tests!!",
            "app-test",
            clock.clone(),
        ));
        let config = SessionsConfig {
            max_stream_viewers: 2,
            ..SessionsConfig::default()
        };
        let negotiator = SessionNegotiator::new(
            ctx,
            consent.clone(),
            limiter,
            issuer.clone(),
            config,
            3600,
        );
        Fixture {
            negotiator,
            consent,
            notifier,
            clock,
            store,
            issuer,
        }
    }
}
