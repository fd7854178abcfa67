//! Unified error handling for the coordinator.
//!
//! Every component operation returns [`CoordResult`]. Errors carry a
//! machine-readable [`ErrorKind`] for clients and a static code used both on
//! the wire and as a metrics label.

use crate::db::DbError;
use huddle_proto::{ErrorKind, ServerFrame};
use thiserror::Error;

/// Errors returned by coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot send a request to yourself")]
    SelfRequest,

    #[error("too many requests, slow down")]
    RateLimited,

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{0} is full")]
    Full(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error")]
    Internal,
}

impl CoordError {
    /// Client-facing failure kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredential(_) => ErrorKind::InvalidCredential,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidArgument(_) | Self::SelfRequest => ErrorKind::InvalidArgument,
            Self::PreconditionFailed(_) | Self::RateLimited => ErrorKind::PreconditionFailed,
            Self::Full(_) => ErrorKind::Full,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::Internal => ErrorKind::Internal,
        }
    }

    /// Get a static error code string for the wire and for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredential(_) => "invalid_credential",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::SelfRequest => "self_request",
            Self::RateLimited => "rate_limited",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Full(_) => "full",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Internal => "internal_error",
        }
    }

    /// Convert to an error frame answering request `id`.
    pub fn to_frame(&self, id: Option<u64>) -> ServerFrame {
        ServerFrame::error(id, self.kind(), self.error_code(), self.to_string())
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }
}

impl From<DbError> for CoordError {
    fn from(err: DbError) -> Self {
        match err {
            // Unique index caught a race the keyed locks did not.
            DbError::Duplicate(what) => Self::Conflict(format!("{what} already exists")),
            other => {
                tracing::error!(error = %other, "store operation failed");
                Self::Internal
            }
        }
    }
}

/// Result type for coordinator operations.
pub type CoordResult<T> = Result<T, CoordError>;
