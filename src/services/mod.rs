//! Coordinator components.
//!
//! - [`ConsentGate`]: pairwise consent relation
//! - [`SessionNegotiator`]: request, chat and call state machines
//! - [`BroadcastCoordinator`]: live event lifecycle, relay tokens, polls
//! - [`Reconciler`]: periodic wall-clock sweeps
//! - [`RequestLimiter`]: request spam guard
//!
//! Every component works against the same [`ServiceContext`] of injected
//! ports, so tests can build isolated instances over an in-memory store, a
//! manual clock and a recording notifier.

pub mod broadcast;
pub mod consent;
pub mod negotiator;
pub mod rate_limit;
pub mod reconcile;

pub use broadcast::{BroadcastCoordinator, RelayGrant};
pub use consent::ConsentGate;
pub use negotiator::{CallJoin, RequestOutcome, SessionNegotiator};
pub use rate_limit::RequestLimiter;
pub use reconcile::{Reconciler, SweepReport, spawn_reconcile_task};

use crate::clock::Clock;
use crate::db::Store;
use crate::error::{CoordError, CoordResult};
use crate::notify::Notifier;
use crate::state::KeyedLocks;
use chrono::{DateTime, Utc};
use huddle_proto::Identity;
use std::sync::Arc;

/// Ports shared by every component.
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<KeyedLocks>,
}

impl ServiceContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Load an identity or fail with `NotFound`.
    pub async fn identity(&self, id: &str) -> CoordResult<Identity> {
        self.store
            .get_identity(id)
            .await?
            .ok_or_else(|| CoordError::not_found("identity", id))
    }
}
