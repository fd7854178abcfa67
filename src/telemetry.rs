//! Telemetry utilities for command timing and span construction.

use std::time::Instant;

/// Guard for timing command execution and recording metrics.
///
/// Records command latency when dropped.
pub struct CommandTimer {
    command: &'static str,
    start: Instant,
}

impl CommandTimer {
    /// Start timing a command.
    pub fn new(command: &'static str) -> Self {
        Self {
            command,
            start: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_command(self.command, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use crate::state::ConnId;
    use std::net::SocketAddr;
    use tracing::{Span, debug_span, info_span};

    /// Span for one client connection task.
    pub fn connection(conn: ConnId, peer: SocketAddr) -> Span {
        info_span!("connection", conn = %conn, peer = %peer, identity = tracing::field::Empty)
    }

    /// Span for one dispatched command.
    pub fn command(name: &str, conn: ConnId, identity: Option<&str>) -> Span {
        match identity {
            Some(identity) => debug_span!("command", name = %name, conn = %conn, identity = %identity),
            None => debug_span!("command", name = %name, conn = %conn),
        }
    }

    /// Span for one reconciliation tick.
    pub fn sweep() -> Span {
        debug_span!("reconcile")
    }
}
