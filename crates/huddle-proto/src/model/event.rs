use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Event category. `Open` events admit anonymous subscriber-only viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    #[default]
    Standard,
    Open,
}

/// A scheduled one-to-many broadcast hosted by an institutional identity.
///
/// Lifecycle: scheduled (`!is_live && !is_completed`, no channel yet) ->
/// live -> stopped (`!is_live`, channel kept, restartable) -> completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub host_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub category: EventCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub participant_count: u32,
    #[serde(default)]
    pub participants: BTreeSet<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_host(&self, identity: &str) -> bool {
        self.host_id == identity
    }

    /// One full duration unit, or `None` if the minutes do not fit a `Duration`.
    pub fn duration(&self) -> Option<Duration> {
        Duration::try_minutes(self.duration_minutes)
    }

    /// Recompute the scheduled end from start + duration.
    ///
    /// Returns `false` and leaves the event unchanged when the end is not
    /// representable.
    #[must_use]
    pub fn recompute_end(&mut self) -> bool {
        let Some(start) = self.scheduled_start else {
            self.scheduled_end = None;
            return true;
        };
        match self
            .duration()
            .and_then(|duration| start.checked_add_signed(duration))
        {
            Some(end) => {
                self.scheduled_end = Some(end);
                true
            }
            None => false,
        }
    }

    /// True once a broadcast has ever been started for this event.
    pub fn has_started(&self) -> bool {
        self.stream_channel.is_some()
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|cap| self.participant_count >= cap)
    }
}

/// Fields supplied by a host when creating an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub category: EventCategory,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of an event; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl EventPatch {
    /// True if the patch moves the event's schedule.
    pub fn touches_schedule(&self) -> bool {
        self.scheduled_start.is_some() || self.duration_minutes.is_some()
    }
}

/// A live viewer as shown in an event roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerEntry {
    pub identity_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}
