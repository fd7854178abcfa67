//! Relay credentials for broadcasts.
//!
//! Accounts are namespaced by role, identity and an optional session tag,
//! so two tabs of the same identity never collide on the relay.

use super::BroadcastCoordinator;
use crate::auth::RelayRole;
use crate::error::{CoordError, CoordResult};
use huddle_proto::{Event, EventCategory, RelayRequestRole};
use serde::Serialize;
use tracing::debug;

const MAX_TAG_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayGrant {
    pub app_id: String,
    pub channel: String,
    pub token: String,
    pub account: String,
    pub role: RelayRole,
}

/// Keep the relay-safe characters of a client-supplied tag.
fn clean_tag(tag: Option<&str>) -> Option<String> {
    let cleaned: String = tag?
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_TAG_LEN)
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn account_name(prefix: &str, identity: &str, tag: Option<&str>) -> String {
    match clean_tag(tag) {
        Some(tag) => format!("{prefix}_{identity}_{tag}"),
        None => format!("{prefix}_{identity}"),
    }
}

fn live_channel_of(event: &Event) -> CoordResult<&str> {
    match event.stream_channel.as_deref() {
        Some(channel) if event.is_live => Ok(channel),
        _ => Err(CoordError::InvalidState("event is not live".into())),
    }
}

impl BroadcastCoordinator {
    /// Host tokens publish, audience tokens only subscribe.
    pub async fn issue_relay_token(
        &self,
        event_id: &str,
        requester: &str,
        role: RelayRequestRole,
        session_tag: Option<&str>,
    ) -> CoordResult<RelayGrant> {
        let event = self.load_event(event_id).await?;
        let (channel, relay_role) = match role {
            RelayRequestRole::Host => {
                if !event.is_host(requester) {
                    return Err(CoordError::Forbidden(
                        "only the host may publish".into(),
                    ));
                }
                let channel = event.stream_channel.as_deref().ok_or_else(|| {
                    CoordError::PreconditionFailed("broadcast has not started".into())
                })?;
                (channel, RelayRole::Publisher)
            }
            RelayRequestRole::Audience => (live_channel_of(&event)?, RelayRole::Subscriber),
        };

        let account = account_name(role.as_str(), requester, session_tag);
        self.grant(channel, account, relay_role)
    }

    /// Subscriber-only token for unauthenticated viewers of open events.
    pub async fn issue_anonymous_token(
        &self,
        event_id: &str,
        session_tag: Option<&str>,
    ) -> CoordResult<RelayGrant> {
        let event = self.load_event(event_id).await?;
        if event.category != EventCategory::Open {
            return Err(CoordError::Forbidden(
                "event does not admit anonymous viewers".into(),
            ));
        }
        let channel = live_channel_of(&event)?;
        let visitor = uuid::Uuid::new_v4().simple().to_string();
        let account = account_name("anon", &visitor[..12], session_tag);
        self.grant(channel, account, RelayRole::Subscriber)
    }

    fn grant(&self, channel: &str, account: String, role: RelayRole) -> CoordResult<RelayGrant> {
        let token = self
            .issuer
            .mint_relay_token(channel, &account, role, self.relay_ttl_secs)?;
        debug!(channel = %channel, account = %account, role = role.as_str(), "relay token issued");
        Ok(RelayGrant {
            app_id: self.issuer.relay_app_id().to_string(),
            channel: channel.to_string(),
            token,
            account,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{draft, fixture};
    use super::*;
    use huddle_proto::EventPatch;

    #[test]
    fn tags_are_cleaned() {
        assert_eq!(account_name("host", "h", Some("tab 1!")), "host_h_tab1");
        assert_eq!(account_name("host", "h", Some("!!")), "host_h");
        assert_eq!(account_name("audience", "v", None), "audience_v");
    }

    #[tokio::test]
    async fn host_token_needs_started_broadcast() {
        let f = fixture().await;
        let event = f.broadcast.create_event("host", draft(0, &f.clock)).await.unwrap();
        assert!(matches!(
            f.broadcast
                .issue_relay_token(&event.id, "host", RelayRequestRole::Host, None)
                .await,
            Err(CoordError::PreconditionFailed(_))
        ));
        assert!(matches!(
            f.broadcast
                .issue_relay_token(&event.id, "v1", RelayRequestRole::Host, None)
                .await,
            Err(CoordError::Forbidden(_))
        ));

        let live = f.broadcast.start_broadcast(&event.id, "host").await.unwrap();
        let grant = f
            .broadcast
            .issue_relay_token(&event.id, "host", RelayRequestRole::Host, Some("tab1"))
            .await
            .unwrap();
        assert_eq!(Some(grant.channel.clone()), live.stream_channel);
        assert_eq!(grant.account, "host_host_tab1");
        assert_eq!(grant.app_id, "app-test");
        let (_, account, role) = f.issuer.inspect_relay_token(&grant.token).unwrap();
        assert_eq!(account, "host_host_tab1");
        assert_eq!(role, RelayRole::Publisher);

        // A stopped broadcast keeps its channel for the host.
        f.broadcast.stop_broadcast(&event.id, "host").await.unwrap();
        assert!(
            f.broadcast
                .issue_relay_token(&event.id, "host", RelayRequestRole::Host, None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn audience_needs_live_event() {
        let f = fixture().await;
        let event = f.broadcast.create_event("host", draft(0, &f.clock)).await.unwrap();
        assert!(matches!(
            f.broadcast
                .issue_relay_token(&event.id, "v1", RelayRequestRole::Audience, None)
                .await,
            Err(CoordError::InvalidState(_))
        ));
        f.broadcast.start_broadcast(&event.id, "host").await.unwrap();
        let grant = f
            .broadcast
            .issue_relay_token(&event.id, "v1", RelayRequestRole::Audience, None)
            .await
            .unwrap();
        assert_eq!(grant.role, RelayRole::Subscriber);
        assert_eq!(grant.account, "audience_v1");
    }

    #[tokio::test]
    async fn anonymous_tokens_only_for_open_events() {
        let f = fixture().await;
        let event = f.broadcast.create_event("host", draft(0, &f.clock)).await.unwrap();
        f.broadcast.start_broadcast(&event.id, "host").await.unwrap();
        assert!(matches!(
            f.broadcast.issue_anonymous_token(&event.id, None).await,
            Err(CoordError::Forbidden(_))
        ));

        let mut open = draft(0, &f.clock);
        open.category = EventCategory::Open;
        let open = f.broadcast.create_event("host", open).await.unwrap();
        assert!(matches!(
            f.broadcast.issue_anonymous_token(&open.id, None).await,
            Err(CoordError::InvalidState(_))
        ));
        f.broadcast.start_broadcast(&open.id, "host").await.unwrap();
        let grant = f.broadcast.issue_anonymous_token(&open.id, Some("kiosk")).await.unwrap();
        assert_eq!(grant.role, RelayRole::Subscriber);
        assert!(grant.account.starts_with("anon_"));
        assert!(grant.account.ends_with("_kiosk"));

        // Patching other fields leaves the category alone.
        let patched = f
            .broadcast
            .update_event(
                &open.id,
                "host",
                EventPatch {
                    description: Some("now with captions".into()),
                    ..EventPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.category, EventCategory::Open);
    }
}
