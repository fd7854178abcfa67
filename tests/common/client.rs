//! Test client.
//!
//! Drives a coordinator through [`huddle::handlers::dispatch`] and reads the
//! frames the hub queues for its connection.

use huddle::handlers::{Session, dispatch};
use huddle::notify::Outbound;
use huddle::{CoordError, Coordinator};
use huddle_proto::ClientCommand;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One in-process connection.
pub struct TestClient {
    coord: Arc<Coordinator>,
    session: Session,
    rx: mpsc::Receiver<Outbound>,
}

#[allow(dead_code)]
impl TestClient {
    /// Register a fresh, unauthenticated connection.
    pub fn open(coord: Arc<Coordinator>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let conn = coord.open_connection(tx);
        Self {
            coord,
            session: Session::new(conn),
            rx,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.session.identity_id()
    }

    /// Run a command, returning the reply payload.
    pub async fn send(&mut self, command: ClientCommand) -> Result<Value, CoordError> {
        dispatch(&self.coord, &mut self.session, command).await
    }

    pub async fn authenticate(&mut self, token: &str) -> Result<Value, CoordError> {
        self.send(ClientCommand::Authenticate {
            token: token.to_string(),
        })
        .await
    }

    /// Every frame queued so far, decoded.
    pub fn frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(payload) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&payload).expect("server frame is JSON"));
        }
        frames
    }

    /// Names of the notifications queued so far.
    pub fn event_names(&mut self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|f| f["event"].as_str().map(str::to_string))
            .collect()
    }

    /// The first queued notification called `name`, discarding everything
    /// before it.
    pub fn expect_event(&mut self, name: &str) -> Value {
        while let Ok(payload) = self.rx.try_recv() {
            let frame: Value = serde_json::from_str(&payload).expect("server frame is JSON");
            if frame["event"] == name {
                return frame;
            }
        }
        panic!("no {name} notification queued");
    }

    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Drop the connection the way the gateway does when a socket closes.
    pub fn close(self) {
        self.coord
            .close_connection(self.session.conn, self.session.identity_id());
    }
}
