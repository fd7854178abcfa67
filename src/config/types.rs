//! Core configuration types and loading.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use super::limits::LimitsConfig;
use super::listen::ListenConfig;
use super::sessions::{BroadcastConfig, ReconcileConfig, SessionsConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Coordinator configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server identity and metrics endpoint.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Persistent store. Absent means the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Credential issuer secrets.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Chat and call negotiation settings.
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Live broadcast settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Reconciliation scheduler.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Outbound notification sink.
    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Deployment name, reported in logs.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090). 0 disables the endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: default_metrics_port(),
        }
    }
}

fn default_server_name() -> String {
    "huddle".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or ":memory:".
    pub path: String,
}

/// Secrets shared with the external auth subsystem and the media relay.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC key used to verify identity tokens.
    #[serde(default)]
    pub identity_secret: String,
    /// HMAC key used to sign relay tokens.
    #[serde(default)]
    pub relay_secret: String,
    /// Relay application id handed to clients with every relay token.
    #[serde(default)]
    pub relay_app_id: String,
    /// Relay token lifetime (default: 3600).
    #[serde(default = "default_relay_token_ttl")]
    pub relay_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_secret: String::new(),
            relay_secret: String::new(),
            relay_app_id: String::new(),
            relay_token_ttl_secs: default_relay_token_ttl(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("identity_secret", &"<redacted>")
            .field("relay_secret", &"<redacted>")
            .field("relay_app_id", &self.relay_app_id)
            .field("relay_token_ttl_secs", &self.relay_token_ttl_secs)
            .finish()
    }
}

fn default_relay_token_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    /// Log notifications instead of delivering them.
    #[default]
    Log,
    /// POST notifications as JSON to `webhook_url`.
    Webhook,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MailConfig {
    #[serde(default)]
    pub backend: MailBackend,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            identity_secret = "a"
            relay_secret = "b"
            relay_app_id = "app"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.name, "huddle");
        assert_eq!(config.auth.relay_token_ttl_secs, 3600);
        assert_eq!(config.sessions.call_request_ttl_secs, 300);
        assert_eq!(config.broadcast.grace_period_secs, 300);
        assert_eq!(config.reconcile.interval_secs, 30);
        assert_eq!(config.limits.requests_per_minute, 20);
        assert_eq!(config.mail.backend, MailBackend::Log);
        assert!(config.database.is_none());
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let auth = AuthConfig {
            identity_secret: "hunter2".into(),
            ..AuthConfig::default()
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn example_config_loads_but_needs_real_secrets() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.listen.address.port(), 8088);
        assert_eq!(config.listen.allow_origins, vec!["https://app.example.org"]);
        assert!(config.database.is_some());

        let errors = crate::config::validate(&config).unwrap_err();
        assert!(errors.contains(&crate::config::ValidationError::WeakSecret("identity_secret")));
        assert!(errors.contains(&crate::config::ValidationError::WeakSecret("relay_secret")));
    }
}
