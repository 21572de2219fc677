//! Credential request and redemption endpoints.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;

use super::types::{RedeemRequest, RequestCodeRequest, SessionTokens};
use super::error_response;
use crate::api::state::TrustState;

#[utoipa::path(
    post,
    path = "/v1/auth/otp/request",
    request_body = RequestCodeRequest,
    responses(
        (status = 202, description = "Code accepted for delivery"),
        (status = 400, description = "Malformed destination", body = super::types::ErrorBody),
        (status = 429, description = "Rate limited", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn request_code(
    state: Extension<Arc<TrustState>>,
    payload: Option<Json<RequestCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match state.otp().issue(&request.destination, request.purpose).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/otp/redeem",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Session minted", body = SessionTokens),
        (status = 401, description = "Invalid code or rejected device", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn redeem_code(
    state: Extension<Arc<TrustState>>,
    payload: Option<Json<RedeemRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match state
        .otp()
        .redeem(
            &request.destination,
            &request.code,
            request.second_code.as_deref(),
            &request.device_id,
        )
        .await
    {
        Ok(issued) => (StatusCode::OK, Json(SessionTokens::from(issued))).into_response(),
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
    use axum::http::StatusCode;
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
    async fn request_code_missing_payload() -> Result<()> {
        let response = request_code(Extension(state()?), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn request_code_invalid_destination() -> Result<()> {
        let response = request_code(
            Extension(state()?),
            Some(Json(RequestCodeRequest {
                destination: "not-a-number".to_string(),
                purpose: crate::otp::Purpose::Login,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn redeem_missing_payload() -> Result<()> {
        let response = redeem_code(Extension(state()?), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn redeem_malformed_code_is_unauthorized() -> Result<()> {
        let response = redeem_code(
            Extension(state()?),
            Some(Json(RedeemRequest {
                destination: "+919876543210".to_string(),
                code: "12".to_string(),
                second_code: None,
                device_id: "dev-1".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
