//! Session negotiation, broadcast and reconciliation settings.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Lifetime of a pending chat request (default: 7 days).
    #[serde(default = "default_chat_request_ttl")]
    pub chat_request_ttl_secs: i64,
    /// Lifetime of a pending call request (default: 5 minutes).
    #[serde(default = "default_call_request_ttl")]
    pub call_request_ttl_secs: i64,
    /// Viewer cap for institutional live streams (default: 50).
    #[serde(default = "default_max_stream_viewers")]
    pub max_stream_viewers: u32,
    /// Maximum message length in characters (default: 4000).
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Largest page returned by `get_messages` (default: 50).
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            chat_request_ttl_secs: default_chat_request_ttl(),
            call_request_ttl_secs: default_call_request_ttl(),
            max_stream_viewers: default_max_stream_viewers(),
            max_message_len: default_max_message_len(),
            history_page_size: default_history_page_size(),
        }
    }
}

fn default_chat_request_ttl() -> i64 {
    7 * 24 * 3600
}

fn default_call_request_ttl() -> i64 {
    300
}

fn default_max_stream_viewers() -> u32 {
    50
}

fn default_max_message_len() -> usize {
    4000
}

fn default_history_page_size() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Seconds past the scheduled end before a live event is force-stopped (default: 300).
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: i64,
    /// Start never-started events once their scheduled start passes (default: true).
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Upper bound for a single `extend_broadcast` (default: 240).
    #[serde(default = "default_max_extend_minutes")]
    pub max_extend_minutes: i64,
    /// Longest duration a host may give an event (default: 10080, one week).
    #[serde(default = "default_max_event_minutes")]
    pub max_event_minutes: i64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            auto_start: true,
            max_extend_minutes: default_max_extend_minutes(),
            max_event_minutes: default_max_event_minutes(),
        }
    }
}

fn default_grace_period() -> i64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_max_extend_minutes() -> i64 {
    240
}

fn default_max_event_minutes() -> i64 {
    7 * 24 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between scheduler ticks (default: 30).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

fn default_interval() -> u64 {
    30
}
