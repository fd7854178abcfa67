//! Prometheus metrics collection for huddle.
//!
//! Exposed on the HTTP endpoint served by [`crate::http`].
//!
//! - `huddle_commands_total{command}` - Commands dispatched by type
//! - `huddle_command_duration_seconds{command}` - Command latency histogram
//! - `huddle_command_errors_total{command,error}` - Failed commands by error code
//! - `huddle_connections` / `huddle_online_identities` - Live gauges
//! - `huddle_notifications_{sent,dropped}_total` - Fan-out outcome
//! - `huddle_sweep_transitions_total{sweep}` - Reconciliation transitions

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Commands dispatched by type.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Command latency by type.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Command errors by type and error code.
pub static COMMAND_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Notifications queued to a connection.
pub static NOTIFICATIONS_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Notifications dropped because a connection's queue was full.
pub static NOTIFICATIONS_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// State transitions applied by the reconciliation scheduler.
pub static SWEEP_TRANSITIONS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

/// Open WebSocket connections.
pub static CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Identities with at least one live connection.
pub static ONLINE_IDENTITIES: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, metric = stringify!($metric), "failed to register metric");
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, metric = stringify!($metric), "failed to create metric");
                    }
                }
            }
        };
    }

    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("huddle_commands_total", "Commands dispatched by type"), &["command"]));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("huddle_command_duration_seconds", "Command latency by type")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["command"]));
    register!(COMMAND_ERRORS, IntCounterVec::new(Opts::new("huddle_command_errors_total", "Command errors by type and code"), &["command", "error"]));
    register!(NOTIFICATIONS_SENT, IntCounter::new("huddle_notifications_sent_total", "Notifications queued to connections"));
    register!(NOTIFICATIONS_DROPPED, IntCounter::new("huddle_notifications_dropped_total", "Notifications dropped due to backpressure"));
    register!(SWEEP_TRANSITIONS, IntCounterVec::new(Opts::new("huddle_sweep_transitions_total", "Reconciliation transitions by sweep"), &["sweep"]));
    register!(CONNECTIONS, IntGauge::new("huddle_connections", "Open WebSocket connections"));
    register!(ONLINE_IDENTITIES, IntGauge::new("huddle_online_identities", "Identities currently online"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a command execution with latency.
#[inline]
pub fn record_command(command: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[command]).observe(duration_secs);
    }
}

/// Record a command error.
#[inline]
pub fn record_command_error(command: &str, error: &str) {
    if let Some(c) = COMMAND_ERRORS.get() {
        c.with_label_values(&[command, error]).inc();
    }
}

#[inline]
pub fn record_notification_sent() {
    if let Some(c) = NOTIFICATIONS_SENT.get() {
        c.inc();
    }
}

#[inline]
pub fn record_notification_dropped() {
    if let Some(c) = NOTIFICATIONS_DROPPED.get() {
        c.inc();
    }
}

/// Record `count` transitions applied by `sweep`.
#[inline]
pub fn record_sweep(sweep: &str, count: usize) {
    if count == 0 {
        return;
    }
    if let Some(c) = SWEEP_TRANSITIONS.get() {
        c.with_label_values(&[sweep]).inc_by(count as u64);
    }
}

#[inline]
pub fn set_connections(count: usize) {
    if let Some(g) = CONNECTIONS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_online_identities(count: usize) {
    if let Some(g) = ONLINE_IDENTITIES.get() {
        g.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_command("ping", 0.001);
        record_command_error("vote", "conflict");
        record_sweep("auto_complete", 2);
        set_online_identities(3);

        let output = gather_metrics();
        assert!(output.contains("huddle_commands_total"));
        assert!(output.contains("huddle_command_errors_total"));
        assert!(output.contains("huddle_sweep_transitions_total"));
    }
}
