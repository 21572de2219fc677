//! Error taxonomy for the trust engine.
//!
//! Every externally distinguishable failure kind gets its own variant so
//! callers can drive retry logic (refresh-then-retry for session-state
//! failures, backoff for rate limits). Infrastructure failures collapse into
//! `Internal` and are never exposed with their underlying storage error text.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid destination")]
    InvalidDestination,

    #[error("rate limited")]
    RateLimited,

    /// Uniform for wrong, expired, and already-consumed codes to prevent
    /// enumeration of which one it was.
    #[error("invalid or expired code")]
    OtpInvalid,

    #[error("device rejected by policy")]
    DeviceRejected,

    #[error("session not found")]
    SessionNotFound,

    #[error("session expired")]
    SessionExpired,

    #[error("session revoked")]
    SessionRevoked,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("refresh lineage expired")]
    RefreshExpired,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable kind, used in response bodies and audit metadata.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDestination => "invalid_destination",
            Self::RateLimited => "rate_limited",
            Self::OtpInvalid => "otp_invalid",
            Self::DeviceRejected => "device_rejected",
            Self::SessionNotFound => "session_not_found",
            Self::SessionExpired => "session_expired",
            Self::SessionRevoked => "session_revoked",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::RefreshExpired => "refresh_expired",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidDestination => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::OtpInvalid
            | Self::DeviceRejected
            | Self::SessionNotFound
            | Self::SessionExpired
            | Self::SessionRevoked
            | Self::InvalidRefreshToken
            | Self::RefreshExpired => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller. Internal errors are logged
    /// server-side and replaced with a generic body.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}
