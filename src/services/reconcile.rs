//! Reconciliation scheduler.
//!
//! Forces event and request state to match the wall clock, compensating
//! for hosts who never pressed start or stop and for requests nobody
//! answered. Each sweep is a pure predicate over an entity plus a
//! transition; the predicate is re-checked under the entity's lock so a
//! manual action racing a tick is never undone.

use super::{BroadcastCoordinator, RequestLimiter, ServiceContext, SessionNegotiator};
use crate::config::BroadcastConfig;
use crate::error::CoordResult;
use crate::metrics;
use crate::state::locks::keys;
use crate::telemetry::spans;
use chrono::{DateTime, Duration, Utc};
use huddle_proto::Event;
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

/// Non-live, unfinished event whose window has closed.
pub fn should_complete(event: &Event, now: DateTime<Utc>) -> bool {
    !event.is_completed && !event.is_live && event.scheduled_end.is_some_and(|end| end <= now)
}

/// Never-started event whose start has passed and whose window is open.
pub fn should_auto_start(event: &Event, now: DateTime<Utc>) -> bool {
    !event.is_live
        && !event.is_completed
        && !event.has_started()
        && event.scheduled_start.is_some_and(|start| start <= now)
        && event.scheduled_end.is_some_and(|end| end > now)
}

/// Live event still running past its end plus the grace period.
pub fn should_auto_stop(event: &Event, now: DateTime<Utc>, grace: Duration) -> bool {
    event.is_live && event.scheduled_end.is_some_and(|end| end <= now - grace)
}

/// Transition counts for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub started: usize,
    pub stopped: usize,
    pub requests_expired: usize,
    pub locks_pruned: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.completed + self.started + self.stopped + self.requests_expired == 0
    }
}

#[derive(Clone, Copy)]
enum Sweep {
    Complete,
    Start,
    Stop,
}

impl Sweep {
    fn label(self) -> &'static str {
        match self {
            Self::Complete => "auto_complete",
            Self::Start => "auto_start",
            Self::Stop => "auto_stop",
        }
    }
}

pub struct Reconciler {
    ctx: ServiceContext,
    broadcast: Arc<BroadcastCoordinator>,
    negotiator: Arc<SessionNegotiator>,
    limiter: Arc<RequestLimiter>,
    config: BroadcastConfig,
}

impl Reconciler {
    pub fn new(
        ctx: ServiceContext,
        broadcast: Arc<BroadcastCoordinator>,
        negotiator: Arc<SessionNegotiator>,
        limiter: Arc<RequestLimiter>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            ctx,
            broadcast,
            negotiator,
            limiter,
            config,
        }
    }

    fn grace(&self) -> Duration {
        Duration::seconds(self.config.grace_period_secs)
    }

    /// Run every sweep once against `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let completed = self.sweep_events(Sweep::Complete, now).await;
        let started = if self.config.auto_start {
            self.sweep_events(Sweep::Start, now).await
        } else {
            0
        };
        let stopped = self.sweep_events(Sweep::Stop, now).await;

        let requests_expired = match self.negotiator.expire_due_requests(now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "request expiry sweep failed");
                0
            }
        };
        metrics::record_sweep("request_expiry", requests_expired);

        let locks_pruned = self.ctx.locks.prune();
        self.limiter.cleanup();

        let report = SweepReport {
            completed,
            started,
            stopped,
            requests_expired,
            locks_pruned,
        };

        if report.is_empty() {
            debug!(locks_pruned = report.locks_pruned, "reconcile tick idle");
        } else {
            info!(
                completed = report.completed,
                started = report.started,
                stopped = report.stopped,
                requests_expired = report.requests_expired,
                "reconcile tick"
            );
        }
        report
    }

    async fn sweep_events(&self, sweep: Sweep, now: DateTime<Utc>) -> usize {
        let candidates = match self.candidates(sweep, now).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, sweep = sweep.label(), "sweep scan failed");
                return 0;
            }
        };

        let mut moved = 0;
        for event in candidates {
            match self.transition(sweep, &event.id, now).await {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, event_id = %event.id, sweep = sweep.label(), "sweep transition failed");
                }
            }
        }
        metrics::record_sweep(sweep.label(), moved);
        moved
    }

    async fn candidates(&self, sweep: Sweep, now: DateTime<Utc>) -> CoordResult<Vec<Event>> {
        let store = &self.ctx.store;
        let events = match sweep {
            Sweep::Complete => store.list_events_ending_by(now).await?,
            Sweep::Start => store.list_events_starting_by(now).await?,
            Sweep::Stop => store.list_events_ending_by(now - self.grace()).await?,
        };
        Ok(events
            .into_iter()
            .filter(|e| self.applies(sweep, e, now))
            .collect())
    }

    fn applies(&self, sweep: Sweep, event: &Event, now: DateTime<Utc>) -> bool {
        match sweep {
            Sweep::Complete => should_complete(event, now),
            Sweep::Start => should_auto_start(event, now),
            Sweep::Stop => should_auto_stop(event, now, self.grace()),
        }
    }

    /// Re-read under the event lock and apply the transition if the
    /// predicate still holds.
    async fn transition(&self, sweep: Sweep, event_id: &str, now: DateTime<Utc>) -> CoordResult<bool> {
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let Some(mut event) = self.ctx.store.get_event(event_id).await? else {
            return Ok(false);
        };
        if !self.applies(sweep, &event, now) {
            return Ok(false);
        }
        match sweep {
            Sweep::Start => self.broadcast.go_live(&mut event, now).await?,
            Sweep::Complete | Sweep::Stop => self.broadcast.complete(&mut event, now).await?,
        }
        info!(event_id = %event.id, sweep = sweep.label(), "event reconciled");
        Ok(true)
    }
}

/// Spawn the reconciliation loop.
///
/// The first tick fires immediately, then every `interval_secs`.
pub fn spawn_reconcile_task(reconciler: Arc<Reconciler>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now = reconciler.ctx.now();
            reconciler.tick(now).instrument(spans::sweep()).await;
        }
    });
}
