//! Credential issuer port.
//!
//! Identity tokens are minted by the external auth subsystem; the coordinator
//! only verifies them. Relay tokens are minted here, scoped to one channel,
//! one account and one privilege level.

mod hmac_issuer;

pub use hmac_issuer::HmacIssuer;

use huddle_proto::Identity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CoordError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<AuthError> for CoordError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(e) => CoordError::UpstreamUnavailable(e),
            other => CoordError::InvalidCredential(other.to_string()),
        }
    }
}

/// Privilege level on the media relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayRole {
    /// Full duplex: may publish and subscribe.
    Publisher,
    /// Read-only.
    Subscriber,
}

impl RelayRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

/// Verifies identity tokens and mints relay tokens.
pub trait CredentialIssuer: Send + Sync {
    fn verify_identity_token(&self, token: &str) -> Result<Identity, AuthError>;

    fn mint_relay_token(
        &self,
        channel: &str,
        account: &str,
        role: RelayRole,
        ttl_secs: u64,
    ) -> Result<String, AuthError>;

    fn relay_app_id(&self) -> &str;
}
