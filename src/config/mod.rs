//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, AuthConfig, MailConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`sessions`]: Negotiation, broadcast and reconciliation settings
//! - [`limits`]: Per-connection limits (LimitsConfig)
//! - [`validation`]: Startup checks

mod limits;
mod listen;
mod sessions;
mod types;
pub mod validation;

pub use limits::LimitsConfig;
pub use listen::ListenConfig;
pub use sessions::{BroadcastConfig, ReconcileConfig, SessionsConfig};
pub use types::{
    AuthConfig, Config, ConfigError, DatabaseConfig, MailBackend, MailConfig, ServerConfig,
};
pub use validation::{ValidationError, validate};
