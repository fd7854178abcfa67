//! Presence tracking.
//!
//! The `PresenceTracker` owns the two transient structures of the
//! coordinator: the online set and the per-event live viewer rosters.
//! Nothing else mutates them; both are rebuilt empty on restart.
//!
//! Presence is reference-counted per identity. A second tab joining does
//! not re-announce the identity, and closing one of two tabs does not
//! announce it offline.

use crate::metrics;
use crate::notify::Notifier;
use crate::state::ConnId;
use dashmap::DashMap;
use huddle_proto::{Notification, Topic, ViewerEntry};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub struct PresenceTracker {
    /// Identity -> its live connections.
    online: DashMap<String, HashSet<ConnId>>,
    /// Event id -> viewer id -> entry.
    rosters: DashMap<String, BTreeMap<String, ViewerEntry>>,
    notifier: Arc<dyn Notifier>,
}

impl PresenceTracker {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            online: DashMap::new(),
            rosters: DashMap::new(),
            notifier,
        }
    }

    /// Bind `conn` to `identity`.
    ///
    /// The new connection always receives the current online snapshot.
    /// Everyone else hears about the identity only when this is its first
    /// connection. Returns true on that 0 -> 1 transition.
    pub fn mark_online(&self, identity: &str, conn: ConnId) -> bool {
        let first = {
            let mut conns = self.online.entry(identity.to_string()).or_default();
            let was_empty = conns.is_empty();
            conns.insert(conn);
            was_empty
        };

        self.notifier.direct(
            conn,
            &Topic::identity(identity),
            Notification::OnlineSnapshot {
                identities: self.online_ids(),
            },
        );

        if first {
            debug!(identity = %identity, "identity online");
            self.notifier.publish_except(
                &Topic::Global,
                Notification::IdentityOnline {
                    identity_id: identity.to_string(),
                },
                conn,
            );
        }
        metrics::set_online_identities(self.online.len());
        first
    }

    /// Unbind `conn`. Returns true when it was the identity's last
    /// connection, in which case "identity offline" is broadcast.
    pub fn mark_offline(&self, identity: &str, conn: ConnId) -> bool {
        let removed = self
            .online
            .remove_if_mut(identity, |_, conns| {
                conns.remove(&conn);
                conns.is_empty()
            })
            .is_some();

        if removed {
            debug!(identity = %identity, "identity offline");
            self.notifier.publish(
                &Topic::Global,
                Notification::IdentityOffline {
                    identity_id: identity.to_string(),
                },
            );
        }
        metrics::set_online_identities(self.online.len());
        removed
    }

    /// Connection-loss cleanup.
    ///
    /// When the identity's last connection drops it is removed from every
    /// roster in one pass, and each affected roster is pushed once.
    /// Returns the number of rosters touched.
    pub fn on_disconnect_cleanup(&self, identity: &str, conn: ConnId) -> usize {
        if !self.mark_offline(identity, conn) {
            return 0;
        }

        let mut affected: Vec<(String, Vec<ViewerEntry>)> = Vec::new();
        for mut roster in self.rosters.iter_mut() {
            if roster.remove(identity).is_some() {
                let viewers = roster.values().cloned().collect();
                affected.push((roster.key().clone(), viewers));
            }
        }
        self.rosters.retain(|_, viewers| !viewers.is_empty());

        for (event_id, viewers) in &affected {
            self.push_roster(event_id, viewers.clone());
        }
        affected.len()
    }

    /// Add a viewer to an event's roster. Re-joining is a no-op.
    pub fn join_roster(&self, event_id: &str, entry: ViewerEntry) -> Vec<ViewerEntry> {
        let (changed, viewers) = {
            let mut roster = self.rosters.entry(event_id.to_string()).or_default();
            let changed = !roster.contains_key(&entry.identity_id);
            if changed {
                roster.insert(entry.identity_id.clone(), entry);
            }
            (changed, roster.values().cloned().collect::<Vec<_>>())
        };
        if changed {
            self.push_roster(event_id, viewers.clone());
        }
        viewers
    }

    pub fn leave_roster(&self, event_id: &str, identity: &str) -> Vec<ViewerEntry> {
        let mut removed = false;
        let mut viewers = Vec::new();
        self.rosters.remove_if_mut(event_id, |_, roster| {
            removed = roster.remove(identity).is_some();
            viewers = roster.values().cloned().collect();
            roster.is_empty()
        });
        if removed {
            self.push_roster(event_id, viewers.clone());
        }
        viewers
    }

    /// Drop an event's roster without a push; callers announce the
    /// stop themselves. Returns how many viewers were dropped.
    pub fn clear_roster(&self, event_id: &str) -> usize {
        self.rosters
            .remove(event_id)
            .map(|(_, roster)| roster.len())
            .unwrap_or(0)
    }

    pub fn roster(&self, event_id: &str) -> Vec<ViewerEntry> {
        self.rosters
            .get(event_id)
            .map(|roster| roster.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Online identity ids, sorted.
    pub fn online_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.online.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.online.contains_key(identity)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn connection_count(&self, identity: &str) -> usize {
        self.online.get(identity).map(|c| c.len()).unwrap_or(0)
    }

    fn push_roster(&self, event_id: &str, viewers: Vec<ViewerEntry>) {
        let count = viewers.len();
        self.notifier.publish(
            &Topic::event_host(event_id),
            Notification::RosterUpdated {
                event_id: event_id.to_string(),
                viewers,
                count,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use chrono::Utc;

    fn tracker() -> (PresenceTracker, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        (PresenceTracker::new(notifier.clone()), notifier)
    }

    fn viewer(id: &str) -> ViewerEntry {
        ViewerEntry {
            identity_id: id.into(),
            display_name: id.to_uppercase(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn second_tab_does_not_reannounce() {
        let (presence, notifier) = tracker();
        assert!(presence.mark_online("a", ConnId(1)));
        assert!(!presence.mark_online("a", ConnId(2)));
        assert_eq!(
            notifier.names(),
            vec!["OnlineSnapshot", "IdentityOnline", "OnlineSnapshot"]
        );
        assert_eq!(presence.connection_count("a"), 2);
    }

    #[test]
    fn offline_only_after_last_connection() {
        let (presence, notifier) = tracker();
        presence.mark_online("a", ConnId(1));
        presence.mark_online("a", ConnId(2));
        notifier.clear();

        assert!(!presence.mark_offline("a", ConnId(1)));
        assert!(presence.is_online("a"));
        assert!(notifier.names().is_empty());

        assert!(presence.mark_offline("a", ConnId(2)));
        assert!(!presence.is_online("a"));
        assert_eq!(notifier.names(), vec!["IdentityOffline"]);
    }

    #[test]
    fn snapshot_goes_to_the_new_connection_only() {
        let (presence, notifier) = tracker();
        presence.mark_online("b", ConnId(9));
        presence.mark_online("a", ConnId(1));
        let snapshot = notifier
            .all()
            .into_iter()
            .rfind(|p| p.notification.name() == "OnlineSnapshot")
            .unwrap();
        assert_eq!(snapshot.conn, Some(ConnId(1)));
        assert_eq!(
            snapshot.notification,
            Notification::OnlineSnapshot {
                identities: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn rejoin_is_idempotent() {
        let (presence, notifier) = tracker();
        presence.join_roster("e1", viewer("v1"));
        presence.join_roster("e1", viewer("v1"));
        assert_eq!(presence.roster("e1").len(), 1);
        assert_eq!(notifier.on(&Topic::event_host("e1")).len(), 1);
    }

    #[test]
    fn disconnect_cleans_every_roster_once() {
        let (presence, notifier) = tracker();
        presence.mark_online("v1", ConnId(1));
        presence.join_roster("e1", viewer("v1"));
        presence.join_roster("e1", viewer("v2"));
        presence.join_roster("e2", viewer("v1"));
        presence.join_roster("e3", viewer("v3"));
        notifier.clear();

        assert_eq!(presence.on_disconnect_cleanup("v1", ConnId(1)), 2);
        assert!(presence.roster("e2").is_empty());
        assert_eq!(presence.roster("e1").len(), 1);
        assert_eq!(presence.roster("e3").len(), 1);

        let pushes = notifier.on(&Topic::event_host("e1"));
        assert_eq!(pushes.len(), 1);
        assert!(matches!(&pushes[0], Notification::RosterUpdated { count: 1, .. }));
        assert!(notifier.on(&Topic::event_host("e3")).is_empty());
    }

    #[test]
    fn disconnect_of_one_tab_keeps_rosters() {
        let (presence, _notifier) = tracker();
        presence.mark_online("v1", ConnId(1));
        presence.mark_online("v1", ConnId(2));
        presence.join_roster("e1", viewer("v1"));
        assert_eq!(presence.on_disconnect_cleanup("v1", ConnId(1)), 0);
        assert_eq!(presence.roster("e1").len(), 1);
    }

    #[test]
    fn clear_roster_is_silent() {
        let (presence, notifier) = tracker();
        presence.join_roster("e1", viewer("v1"));
        notifier.clear();
        assert_eq!(presence.clear_roster("e1"), 1);
        assert_eq!(presence.clear_roster("e1"), 0);
        assert!(notifier.all().is_empty());
    }
}
