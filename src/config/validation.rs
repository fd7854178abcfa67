//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, MailBackend};
use std::path::Path;
use thiserror::Error;

/// Secrets that ship in `config.example.toml` and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "changeme", "secret", "default"];

const MIN_SECRET_LEN: usize = 16;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("auth.{0} is required")]
    MissingSecret(&'static str),
    #[error("auth.{0} is a placeholder or shorter than {MIN_SECRET_LEN} characters")]
    WeakSecret(&'static str),
    #[error("auth.relay_app_id is required")]
    MissingRelayAppId,
    #[error("auth.relay_token_ttl_secs must be positive")]
    InvalidRelayTtl,
    #[error("sessions.{0} must be positive")]
    NonPositive(&'static str),
    #[error("broadcast.grace_period_secs must not be negative")]
    NegativeGracePeriod,
    #[error("broadcast.{0} must be positive")]
    NonPositiveBroadcastLimit(&'static str),
    #[error("reconcile.interval_secs must be positive")]
    InvalidReconcileInterval,
    #[error("limits.{0} must be positive")]
    InvalidLimit(&'static str),
    #[error("mail.webhook_url is required when mail.backend = \"webhook\"")]
    MissingWebhookUrl,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

fn check_secret(name: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.is_empty() {
        errors.push(ValidationError::MissingSecret(name));
    } else if value.len() < MIN_SECRET_LEN
        || PLACEHOLDER_SECRETS
            .iter()
            .any(|p| value.eq_ignore_ascii_case(p))
    {
        errors.push(ValidationError::WeakSecret(name));
    }
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    check_secret("identity_secret", &config.auth.identity_secret, &mut errors);
    check_secret("relay_secret", &config.auth.relay_secret, &mut errors);
    if config.auth.relay_app_id.is_empty() {
        errors.push(ValidationError::MissingRelayAppId);
    }
    if config.auth.relay_token_ttl_secs == 0 {
        errors.push(ValidationError::InvalidRelayTtl);
    }

    let sessions = &config.sessions;
    if sessions.chat_request_ttl_secs <= 0 {
        errors.push(ValidationError::NonPositive("chat_request_ttl_secs"));
    }
    if sessions.call_request_ttl_secs <= 0 {
        errors.push(ValidationError::NonPositive("call_request_ttl_secs"));
    }
    if sessions.max_message_len == 0 {
        errors.push(ValidationError::NonPositive("max_message_len"));
    }
    if sessions.history_page_size == 0 {
        errors.push(ValidationError::NonPositive("history_page_size"));
    }

    if config.broadcast.grace_period_secs < 0 {
        errors.push(ValidationError::NegativeGracePeriod);
    }
    if config.broadcast.max_extend_minutes <= 0 {
        errors.push(ValidationError::NonPositiveBroadcastLimit("max_extend_minutes"));
    }
    if config.broadcast.max_event_minutes <= 0 {
        errors.push(ValidationError::NonPositiveBroadcastLimit("max_event_minutes"));
    }
    if config.reconcile.interval_secs == 0 {
        errors.push(ValidationError::InvalidReconcileInterval);
    }

    if config.limits.outbound_queue == 0 {
        errors.push(ValidationError::InvalidLimit("outbound_queue"));
    }
    if config.limits.auth_timeout_secs == 0 {
        errors.push(ValidationError::InvalidLimit("auth_timeout_secs"));
    }
    if config.limits.requests_per_minute == 0 {
        errors.push(ValidationError::InvalidLimit("requests_per_minute"));
    }

    if config.mail.backend == MailBackend::Webhook
        && config.mail.webhook_url.as_deref().is_none_or(str::is_empty)
    {
        errors.push(ValidationError::MissingWebhookUrl);
    }

    if let Some(ref db) = config.database {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
