//! Broadcast coordinator.
//!
//! Per-event state machine:
//!
//! ```text
//! scheduled --start--> live --stop--> stopped --start--> live
//!     |                  |               |
//!     +------------------+---------------+--> completed (end + grace, or sweep)
//! ```
//!
//! "Stopped" is `!is_live && !is_completed` with a channel already
//! assigned; the event stays joinable and restartable until its window
//! closes. Starting a completed event past its end re-opens the window.
//!
//! Every mutation of an event runs under its keyed lock.

mod events;
mod lifecycle;
mod polls;
mod relay;

pub use relay::RelayGrant;

use super::ServiceContext;
use crate::auth::CredentialIssuer;
use crate::config::BroadcastConfig;
use crate::error::{CoordError, CoordResult};
use crate::mail::Mailer;
use crate::state::PresenceTracker;
use huddle_proto::Event;
use std::sync::Arc;

pub struct BroadcastCoordinator {
    ctx: ServiceContext,
    presence: Arc<PresenceTracker>,
    issuer: Arc<dyn CredentialIssuer>,
    mailer: Arc<dyn Mailer>,
    config: BroadcastConfig,
    relay_ttl_secs: u64,
}

impl BroadcastCoordinator {
    pub fn new(
        ctx: ServiceContext,
        presence: Arc<PresenceTracker>,
        issuer: Arc<dyn CredentialIssuer>,
        mailer: Arc<dyn Mailer>,
        config: BroadcastConfig,
        relay_ttl_secs: u64,
    ) -> Self {
        Self {
            ctx,
            presence,
            issuer,
            mailer,
            config,
            relay_ttl_secs,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    async fn load_event(&self, id: &str) -> CoordResult<Event> {
        self.ctx
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| CoordError::not_found("event", id))
    }

    /// Load an event and check that `actor` hosts it.
    async fn hosted_event(&self, id: &str, actor: &str) -> CoordResult<Event> {
        let event = self.load_event(id).await?;
        if !event.is_host(actor) {
            return Err(CoordError::Forbidden("only the host may do that".into()));
        }
        Ok(event)
    }
}
