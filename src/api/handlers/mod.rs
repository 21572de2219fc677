//! HTTP handlers: thin adapters between the transport and the trust engine.
//!
//! The session state machine knows nothing about headers or cookies; the
//! bearer-carrying mechanism lives here at the edge.

pub mod audit;
pub mod health;
pub mod otp;
pub mod session;
pub mod types;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use tracing::error;

use crate::errors::AuthError;
use types::ErrorBody;

/// Map an engine error onto the wire. Internal causes are logged here and
/// never serialized.
pub(crate) fn error_response(err: &AuthError) -> Response {
    if let AuthError::Internal(cause) = err {
        error!("internal error: {cause:#}");
    }
    (
        err.status(),
        Json(ErrorBody {
            error: err.kind().to_string(),
            message: err.public_message(),
        }),
    )
        .into_response()
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
