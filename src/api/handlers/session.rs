//! Bearer validation, refresh, and revocation endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::types::{RefreshRequest, SessionInfo, SessionTokens};
use super::{error_response, extract_bearer_token};
use crate::api::state::TrustState;
use crate::errors::AuthError;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Bearer is authorized", body = SessionInfo),
        (status = 401, description = "Missing, expired, or revoked bearer", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, state: Extension<Arc<TrustState>>) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return error_response(&AuthError::SessionNotFound);
    };
    match state.sessions().validate(&token).await {
        Ok(valid) => (StatusCode::OK, Json(SessionInfo::from(valid))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/session/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session rotated", body = SessionTokens),
        (status = 401, description = "Invalid or expired refresh token", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<TrustState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let token = request.refresh_token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing refresh token".to_string()).into_response();
    }

    match state.sessions().refresh(token).await {
        Ok(issued) => (StatusCode::OK, Json(SessionTokens::from(issued))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/session/revoke",
    responses(
        (status = 204, description = "Session revoked (idempotent)")
    ),
    tag = "auth"
)]
pub async fn revoke(headers: HeaderMap, state: Extension<Arc<TrustState>>) -> impl IntoResponse {
    // Revocation with no bearer is a no-op success, matching its idempotent
    // contract.
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match state.sessions().revoke(&token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::state::TrustState;
    use crate::config::TrustConfig;
    use crate::delivery::LogCodeSender;
    use crate::otp::OtpService;
    use crate::profile::PgProfileDirectory;
    use crate::session::SessionService;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn state() -> Result<Arc<TrustState>> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let config = TrustConfig::new();
        let sessions = SessionService::new(pool.clone(), config.clone());
        let otp = OtpService::new(
            pool.clone(),
            config.clone(),
            Arc::new(LogCodeSender),
            Arc::new(PgProfileDirectory::new(pool)),
            sessions.clone(),
        );
        Ok(Arc::new(TrustState::new(config, otp, sessions)))
    }

    #[tokio::test]
    async fn session_without_bearer_is_unauthorized() -> Result<()> {
        let response = session(HeaderMap::new(), Extension(state()?))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_missing_payload() -> Result<()> {
        let response = refresh(Extension(state()?), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_empty_token() -> Result<()> {
        let response = refresh(
            Extension(state()?),
            Some(Json(RefreshRequest {
                refresh_token: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn revoke_without_bearer_is_noop_success() -> Result<()> {
        let response = revoke(HeaderMap::new(), Extension(state()?))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }
}
