//! Per-connection limits configuration.

use serde::Deserialize;

/// Per-connection limits.
///
/// These bound what one client can cost the coordinator: queued outbound
/// frames, idle unauthenticated sockets, and request spam.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Outbound frame queue per connection (default: 256).
    /// Notifications are dropped when the queue is full.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Seconds an unauthenticated connection may stay open (default: 30).
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
    /// Seconds between WebSocket pings (default: 30).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Connection and session requests allowed per identity per minute (default: 20).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            auth_timeout_secs: default_auth_timeout(),
            ping_interval_secs: default_ping_interval(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_outbound_queue() -> usize {
    256
}

fn default_auth_timeout() -> u64 {
    30
}

fn default_ping_interval() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    20
}
