//! Notification fan-out.
//!
//! Components publish a typed [`Notification`] to one or more [`Topic`]s and
//! never see sockets. Delivery is best-effort and at most once per
//! connection: a connection whose outbound queue is full misses the
//! notification and must re-derive state with a pull query.

mod hub;
mod recording;

pub use hub::{Hub, Outbound};
pub use recording::{Published, RecordingNotifier};

use crate::state::ConnId;
use huddle_proto::{Notification, Topic};

pub trait Notifier: Send + Sync {
    /// Deliver to every subscriber of any of `topics`, one copy per
    /// connection. Returns the number of connections reached.
    fn publish_all(&self, topics: &[Topic], notification: Notification) -> usize;

    /// Deliver to every subscriber of `topic` except `except`.
    fn publish_except(&self, topic: &Topic, notification: Notification, except: ConnId) -> usize;

    /// Deliver to a single connection, labelled with `topic`.
    fn direct(&self, conn: ConnId, topic: &Topic, notification: Notification) -> bool;

    fn publish(&self, topic: &Topic, notification: Notification) -> usize {
        self.publish_all(std::slice::from_ref(topic), notification)
    }
}
