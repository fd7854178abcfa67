//! Start, stop, extend and the forced transitions used by the sweeps.

use super::BroadcastCoordinator;
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use chrono::{DateTime, Duration, Utc};
use huddle_proto::{Event, Notification, Topic, sanitize_channel_name};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::{info, warn};

/// Relay channel for a broadcast, seeded by host, title and start time.
pub fn live_channel(host_id: &str, title: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(host_id.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = hasher.finalize();

    let mut name = String::from("live_");
    for byte in digest {
        let _ = write!(name, "{byte:02x}");
    }
    // 5 + 64 hex chars; the relay caps names at 64.
    sanitize_channel_name(&name).unwrap_or(name)
}

impl BroadcastCoordinator {
    /// Host goes live.
    pub async fn start_broadcast(&self, event_id: &str, actor: &str) -> CoordResult<Event> {
        self.hosted_event(event_id, actor).await?;

        let event = {
            let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
            let mut event = self.load_event(event_id).await?;
            if event.is_live {
                return Err(CoordError::Conflict("broadcast is already live".into()));
            }
            let now = self.ctx.now();
            let Some(start) = event.scheduled_start else {
                return Err(CoordError::PreconditionFailed(
                    "event has no scheduled start".into(),
                ));
            };
            if now < start {
                return Err(CoordError::PreconditionFailed(
                    "event has not reached its scheduled start".into(),
                ));
            }

            // Overrun restart: re-open the window by one duration unit.
            if let Some(end) = event.scheduled_end
                && end <= now
            {
                let reopened = event
                    .duration()
                    .and_then(|duration| now.checked_add_signed(duration))
                    .ok_or_else(|| {
                        CoordError::InvalidArgument("scheduled end is out of range".into())
                    })?;
                event.scheduled_end = Some(reopened);
                info!(event_id = %event.id, "broadcast window re-opened");
            }
            self.go_live(&mut event, now).await?;
            event
        };

        self.mail_participants(&event).await;
        Ok(event)
    }

    /// Host stops streaming. The event stays restartable until completed.
    pub async fn stop_broadcast(&self, event_id: &str, actor: &str) -> CoordResult<Event> {
        self.hosted_event(event_id, actor).await?;
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let mut event = self.load_event(event_id).await?;
        if !event.is_live {
            return Err(CoordError::InvalidState("broadcast is not live".into()));
        }

        event.is_live = false;
        event.updated_at = self.ctx.now();
        self.ctx.store.update_event(&event).await?;
        self.presence.clear_roster(&event.id);
        info!(event_id = %event.id, "broadcast stopped");

        self.publish_stopped(&event);
        Ok(event)
    }

    /// Push the scheduled end forward by `minutes`.
    pub async fn extend_broadcast(
        &self,
        event_id: &str,
        actor: &str,
        minutes: i64,
    ) -> CoordResult<Event> {
        if !(1..=self.config.max_extend_minutes).contains(&minutes) {
            return Err(CoordError::InvalidArgument(format!(
                "extension must be between 1 and {} minutes",
                self.config.max_extend_minutes
            )));
        }
        self.hosted_event(event_id, actor).await?;

        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let mut event = self.load_event(event_id).await?;
        let Some(end) = event.scheduled_end else {
            return Err(CoordError::PreconditionFailed(
                "event has no scheduled end".into(),
            ));
        };
        let now = self.ctx.now();
        let new_end = Duration::try_minutes(minutes)
            .and_then(|by| end.checked_add_signed(by))
            .ok_or_else(|| CoordError::InvalidArgument("scheduled end is out of range".into()))?;
        event.scheduled_end = Some(new_end);
        if new_end > now {
            event.is_completed = false;
        }
        event.updated_at = now;
        self.ctx.store.update_event(&event).await?;
        info!(event_id = %event.id, minutes, "broadcast extended");

        self.publish_updated(&event);
        Ok(event)
    }

    /// Assign a fresh channel and mark the event live. Caller holds the
    /// event lock.
    pub(crate) async fn go_live(&self, event: &mut Event, now: DateTime<Utc>) -> CoordResult<()> {
        event.stream_channel = Some(live_channel(&event.host_id, &event.title, now));
        event.is_live = true;
        event.is_completed = false;
        event.live_started_at = Some(now);
        event.updated_at = now;
        self.ctx.store.update_event(event).await?;
        info!(event_id = %event.id, "broadcast started");

        self.ctx.notifier.publish_all(
            &[Topic::event_host(&event.id), Topic::Global],
            Notification::BroadcastStarted {
                event: event.clone(),
            },
        );
        Ok(())
    }

    /// Terminal transition. Caller holds the event lock.
    pub(crate) async fn complete(&self, event: &mut Event, now: DateTime<Utc>) -> CoordResult<()> {
        event.is_live = false;
        event.is_completed = true;
        event.updated_at = now;
        self.ctx.store.update_event(event).await?;
        self.presence.clear_roster(&event.id);
        info!(event_id = %event.id, "event completed");

        self.publish_stopped(event);
        self.publish_updated(event);
        Ok(())
    }

    fn publish_stopped(&self, event: &Event) {
        self.ctx.notifier.publish_all(
            &[Topic::event_host(&event.id), Topic::Global],
            Notification::BroadcastStopped {
                event_id: event.id.clone(),
                completed: event.is_completed,
            },
        );
    }

    pub(super) fn publish_updated(&self, event: &Event) {
        self.ctx.notifier.publish_all(
            &[Topic::Global, Topic::event_host(&event.id)],
            Notification::EventUpdated {
                event: event.clone(),
            },
        );
    }

    /// Tell registered participants the event is live. Sink failures are
    /// logged and swallowed.
    async fn mail_participants(&self, event: &Event) {
        let mut recipients = Vec::new();
        for participant in &event.participants {
            match self.ctx.store.get_identity(participant).await {
                Ok(Some(identity)) => recipients.extend(identity.email),
                Ok(None) => {}
                Err(e) => warn!(error = %e, identity = %participant, "participant lookup failed"),
            }
        }
        if recipients.is_empty() {
            return;
        }

        let subject = format!("{} is live now", event.title);
        let body = format!(
            "The event \"{}\" you registered for has started. Join from your events page.",
            event.title
        );
        if let Err(e) = self.mailer.send(&recipients, &subject, &body).await {
            warn!(error = %e, event_id = %event.id, "broadcast mail failed");
        }
    }
}
