//! Event CRUD, registration and the live viewer roster.

use super::BroadcastCoordinator;
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use crate::state::new_entity_id;
use huddle_proto::{
    Event, EventDraft, EventFilter, EventPatch, Notification, Topic, ViewerEntry,
};
use std::collections::BTreeSet;
use tracing::info;

/// Set the scheduled end from start + duration.
fn schedule_end(event: &mut Event) -> CoordResult<()> {
    if !event.recompute_end() {
        return Err(CoordError::InvalidArgument(
            "scheduled end is out of range".into(),
        ));
    }
    Ok(())
}

fn check_capacity(capacity: Option<u32>) -> CoordResult<()> {
    if capacity == Some(0) {
        return Err(CoordError::InvalidArgument("capacity must be positive".into()));
    }
    Ok(())
}

impl BroadcastCoordinator {
    fn check_duration(&self, minutes: i64) -> CoordResult<()> {
        if !(1..=self.config.max_event_minutes).contains(&minutes) {
            return Err(CoordError::InvalidArgument(format!(
                "duration must be between 1 and {} minutes",
                self.config.max_event_minutes
            )));
        }
        Ok(())
    }

    /// Institutional identities schedule events.
    pub async fn create_event(&self, actor: &str, draft: EventDraft) -> CoordResult<Event> {
        let host = self.ctx.identity(actor).await?;
        if !host.is_institutional() {
            return Err(CoordError::Forbidden(
                "only institutional identities host events".into(),
            ));
        }
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(CoordError::InvalidArgument("title is required".into()));
        }
        self.check_duration(draft.duration_minutes)?;
        check_capacity(draft.capacity)?;

        let now = self.ctx.now();
        let mut event = Event {
            id: new_entity_id(),
            host_id: host.id,
            title: title.to_string(),
            description: draft.description,
            event_type: draft.event_type,
            category: draft.category,
            scheduled_start: draft.scheduled_start,
            scheduled_end: None,
            duration_minutes: draft.duration_minutes,
            capacity: draft.capacity,
            participant_count: 0,
            participants: BTreeSet::new(),
            is_live: false,
            is_completed: false,
            stream_channel: None,
            live_started_at: None,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        };
        schedule_end(&mut event)?;
        self.ctx.store.insert_event(&event).await?;
        info!(event_id = %event.id, host = %event.host_id, "event created");

        self.ctx.notifier.publish(
            &Topic::Global,
            Notification::EventCreated {
                event: event.clone(),
            },
        );
        Ok(event)
    }

    /// Host edits. The schedule is frozen while live.
    pub async fn update_event(
        &self,
        event_id: &str,
        actor: &str,
        patch: EventPatch,
    ) -> CoordResult<Event> {
        self.hosted_event(event_id, actor).await?;
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let mut event = self.load_event(event_id).await?;
        if patch.touches_schedule() && event.is_live {
            return Err(CoordError::InvalidState(
                "cannot reschedule a live broadcast".into(),
            ));
        }
        if let Some(minutes) = patch.duration_minutes {
            self.check_duration(minutes)?;
        }
        check_capacity(patch.capacity)?;

        let reschedule = patch.touches_schedule();
        if let Some(title) = patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(CoordError::InvalidArgument("title is required".into()));
            }
            event.title = title.to_string();
        }
        if let Some(description) = patch.description {
            event.description = description;
        }
        if let Some(event_type) = patch.event_type {
            event.event_type = event_type;
        }
        if let Some(start) = patch.scheduled_start {
            event.scheduled_start = Some(start);
        }
        if let Some(minutes) = patch.duration_minutes {
            event.duration_minutes = minutes;
        }
        if let Some(capacity) = patch.capacity {
            event.capacity = Some(capacity);
        }
        if let Some(tags) = patch.tags {
            event.tags = tags;
        }

        let now = self.ctx.now();
        if reschedule {
            schedule_end(&mut event)?;
            if event.scheduled_end.is_some_and(|end| end > now) {
                event.is_completed = false;
            }
        }
        event.updated_at = now;
        self.ctx.store.update_event(&event).await?;
        info!(event_id = %event.id, reschedule, "event updated");

        self.publish_updated(&event);
        Ok(event)
    }

    /// Host removes an event that is not live, with its polls and roster.
    pub async fn delete_event(&self, event_id: &str, actor: &str) -> CoordResult<()> {
        self.hosted_event(event_id, actor).await?;
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let event = self.load_event(event_id).await?;
        if event.is_live {
            return Err(CoordError::InvalidState(
                "stop the broadcast before deleting".into(),
            ));
        }

        let polls = self.ctx.store.delete_polls_for_event(&event.id).await?;
        self.ctx.store.delete_event(&event.id).await?;
        self.presence.clear_roster(&event.id);
        info!(event_id = %event.id, polls, "event deleted");

        self.ctx.notifier.publish_all(
            &[Topic::Global, Topic::event_host(&event.id)],
            Notification::EventDeleted { event_id: event.id },
        );
        Ok(())
    }

    /// Register for an event. Registering twice is a no-op.
    pub async fn join_event(&self, event_id: &str, actor: &str) -> CoordResult<Event> {
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let mut event = self.load_event(event_id).await?;
        if event.is_completed {
            return Err(CoordError::InvalidState("event is over".into()));
        }
        if event.participants.contains(actor) {
            return Ok(event);
        }
        if event.is_full() {
            return Err(CoordError::Full("event".into()));
        }

        event.participants.insert(actor.to_string());
        event.participant_count += 1;
        event.updated_at = self.ctx.now();
        self.ctx.store.update_event(&event).await?;

        self.ctx.notifier.publish(
            &Topic::event_host(&event.id),
            Notification::EventUpdated {
                event: event.clone(),
            },
        );
        Ok(event)
    }

    pub async fn list_events(&self, actor: &str, filter: EventFilter) -> CoordResult<Vec<Event>> {
        let events = self.ctx.store.list_events().await?;
        Ok(events
            .into_iter()
            .filter(|e| match filter {
                EventFilter::All => true,
                EventFilter::Upcoming => !e.is_live && !e.is_completed,
                EventFilter::Live => e.is_live,
                EventFilter::Hosted => e.is_host(actor),
            })
            .collect())
    }

    pub async fn get_event(&self, event_id: &str) -> CoordResult<Event> {
        self.load_event(event_id).await
    }

    /// Enter the live viewer roster of a live event.
    pub async fn join_viewer_roster(
        &self,
        event_id: &str,
        actor: &str,
    ) -> CoordResult<Vec<ViewerEntry>> {
        let identity = self.ctx.identity(actor).await?;
        // Stop and the sweeps clear the roster under this lock.
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        let event = self.load_event(event_id).await?;
        if !event.is_live {
            return Err(CoordError::InvalidState("event is not live".into()));
        }
        Ok(self.presence.join_roster(
            &event.id,
            ViewerEntry {
                identity_id: identity.id,
                display_name: identity.display_name,
                joined_at: self.ctx.now(),
            },
        ))
    }

    pub async fn leave_viewer_roster(
        &self,
        event_id: &str,
        actor: &str,
    ) -> CoordResult<Vec<ViewerEntry>> {
        let _guard = self.ctx.locks.lock(keys::event(event_id)).await;
        self.load_event(event_id).await?;
        Ok(self.presence.leave_roster(event_id, actor))
    }

    pub async fn roster(&self, event_id: &str) -> CoordResult<Vec<ViewerEntry>> {
        self.load_event(event_id).await?;
        Ok(self.presence.roster(event_id))
    }
}
