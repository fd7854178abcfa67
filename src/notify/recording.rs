//! Test double that captures published notifications synchronously.

use super::Notifier;
use crate::state::ConnId;
use huddle_proto::{Notification, Topic};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topics: Vec<Topic>,
    pub notification: Notification,
    /// Set for `direct` deliveries.
    pub conn: Option<ConnId>,
    /// Set for `publish_except`.
    pub except: Option<ConnId>,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    log: Mutex<Vec<Published>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn all(&self) -> Vec<Published> {
        self.log.lock().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Published> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Notifications addressed to `topic`, oldest first.
    pub fn on(&self, topic: &Topic) -> Vec<Notification> {
        self.log
            .lock()
            .iter()
            .filter(|p| p.topics.contains(topic))
            .map(|p| p.notification.clone())
            .collect()
    }

    /// Names of every published notification, oldest first.
    pub fn names(&self) -> Vec<&'static str> {
        self.log
            .lock()
            .iter()
            .map(|p| p.notification.name())
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn publish_all(&self, topics: &[Topic], notification: Notification) -> usize {
        self.log.lock().push(Published {
            topics: topics.to_vec(),
            notification,
            conn: None,
            except: None,
        });
        0
    }

    fn publish_except(&self, topic: &Topic, notification: Notification, except: ConnId) -> usize {
        self.log.lock().push(Published {
            topics: vec![topic.clone()],
            notification,
            conn: None,
            except: Some(except),
        });
        0
    }

    fn direct(&self, conn: ConnId, topic: &Topic, notification: Notification) -> bool {
        self.log.lock().push(Published {
            topics: vec![topic.clone()],
            notification,
            conn: Some(conn),
            except: None,
        });
        true
    }
}
