//! In-process publish/subscribe hub.

use super::Notifier;
use crate::metrics;
use crate::state::ConnId;
use dashmap::DashMap;
use huddle_proto::{Notification, ServerFrame, Topic};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Serialized frame queued for a connection's writer.
pub type Outbound = Arc<str>;

/// Routes notifications to the outbound queues of subscribed connections.
#[derive(Default)]
pub struct Hub {
    /// Outbound queue per registered connection.
    senders: DashMap<ConnId, mpsc::Sender<Outbound>>,
    /// Topic -> subscribed connections.
    subscribers: DashMap<Topic, HashSet<ConnId>>,
    /// Connection -> its topics, for cleanup on unregister.
    memberships: DashMap<ConnId, HashSet<Topic>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn: ConnId, sender: mpsc::Sender<Outbound>) {
        self.senders.insert(conn, sender);
    }

    /// Drop a connection and all of its subscriptions.
    pub fn unregister(&self, conn: ConnId) {
        self.senders.remove(&conn);
        if let Some((_, topics)) = self.memberships.remove(&conn) {
            for topic in topics {
                self.subscribers.remove_if_mut(&topic, |_, conns| {
                    conns.remove(&conn);
                    conns.is_empty()
                });
            }
        }
    }

    pub fn subscribe(&self, conn: ConnId, topic: Topic) {
        self.subscribers
            .entry(topic.clone())
            .or_default()
            .insert(conn);
        self.memberships.entry(conn).or_default().insert(topic);
    }

    pub fn unsubscribe(&self, conn: ConnId, topic: &Topic) {
        self.subscribers.remove_if_mut(topic, |_, conns| {
            conns.remove(&conn);
            conns.is_empty()
        });
        if let Some(mut topics) = self.memberships.get_mut(&conn) {
            topics.remove(topic);
        }
    }

    pub fn is_subscribed(&self, conn: ConnId, topic: &Topic) -> bool {
        self.subscribers
            .get(topic)
            .is_some_and(|conns| conns.contains(&conn))
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Queue a raw frame for one connection.
    pub fn send_frame(&self, conn: ConnId, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.deliver(conn, &Arc::from(json)),
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                false
            }
        }
    }

    fn deliver(&self, conn: ConnId, payload: &Outbound) -> bool {
        let Some(sender) = self.senders.get(&conn).map(|s| s.clone()) else {
            return false;
        };
        match sender.try_send(Arc::clone(payload)) {
            Ok(()) => {
                metrics::record_notification_sent();
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(conn = %conn, "outbound queue full, notification dropped");
                metrics::record_notification_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn encode(topic: &Topic, notification: &Notification) -> Option<Outbound> {
        let frame = ServerFrame::event(topic.clone(), notification.clone());
        match serde_json::to_string(&frame) {
            Ok(json) => Some(Arc::from(json)),
            Err(e) => {
                warn!(error = %e, event = notification.name(), "failed to encode notification");
                None
            }
        }
    }

    fn targets(&self, topic: &Topic) -> Vec<ConnId> {
        self.subscribers
            .get(topic)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Notifier for Hub {
    fn publish_all(&self, topics: &[Topic], notification: Notification) -> usize {
        let mut reached: HashSet<ConnId> = HashSet::new();
        let mut delivered = 0;
        for topic in topics {
            let targets: Vec<ConnId> = self
                .targets(topic)
                .into_iter()
                .filter(|c| !reached.contains(c))
                .collect();
            if targets.is_empty() {
                continue;
            }
            let Some(payload) = Self::encode(topic, &notification) else {
                continue;
            };
            for conn in targets {
                reached.insert(conn);
                if self.deliver(conn, &payload) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn publish_except(&self, topic: &Topic, notification: Notification, except: ConnId) -> usize {
        let targets: Vec<ConnId> = self
            .targets(topic)
            .into_iter()
            .filter(|c| *c != except)
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let Some(payload) = Self::encode(topic, &notification) else {
            return 0;
        };
        targets
            .into_iter()
            .filter(|conn| self.deliver(*conn, &payload))
            .count()
    }

    fn direct(&self, conn: ConnId, topic: &Topic, notification: Notification) -> bool {
        Self::encode(topic, &notification).is_some_and(|payload| self.deliver(conn, &payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online(id: &str) -> Notification {
        Notification::IdentityOnline {
            identity_id: id.into(),
        }
    }

    #[tokio::test]
    async fn one_copy_per_connection_across_topics() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = ConnId(1);
        hub.register(conn, tx);
        hub.subscribe(conn, Topic::Global);
        hub.subscribe(conn, Topic::identity("a"));

        let n = hub.publish_all(&[Topic::identity("a"), Topic::Global], online("a"));
        assert_eq!(n, 1);
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("IdentityOnline"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(1);
        let conn = ConnId(7);
        hub.register(conn, tx);
        hub.subscribe(conn, Topic::Global);
        assert_eq!(hub.publish(&Topic::Global, online("a")), 1);
        assert_eq!(hub.publish(&Topic::Global, online("b")), 0);
    }

    #[tokio::test]
    async fn unregister_clears_subscriptions() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(4);
        let conn = ConnId(3);
        hub.register(conn, tx);
        hub.subscribe(conn, Topic::chat("c"));
        hub.unregister(conn);
        assert!(!hub.is_subscribed(conn, &Topic::chat("c")));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.publish(&Topic::chat("c"), online("x")), 0);
    }

    #[tokio::test]
    async fn publish_except_skips_origin() {
        let hub = Hub::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        hub.register(ConnId(1), tx1);
        hub.register(ConnId(2), tx2);
        hub.subscribe(ConnId(1), Topic::Global);
        hub.subscribe(ConnId(2), Topic::Global);
        assert_eq!(hub.publish_except(&Topic::Global, online("a"), ConnId(1)), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }
}
