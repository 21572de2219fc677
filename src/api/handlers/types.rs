//! Request/response types for the trust engine endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::otp::Purpose;
use crate::session::models::{IssuedSession, ValidatedSession};
use crate::session::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestCodeRequest {
    pub destination: String,
    pub purpose: Purpose,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RedeemRequest {
    pub destination: String,
    pub code: String,
    /// Second code for roles whose policy requires an `admin_confirm` check.
    #[serde(default)]
    pub second_code: Option<String>,
    pub device_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned exactly once per mint; tokens are not recoverable afterwards.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionTokens {
    pub session_id: Uuid,
    pub session_token: String,
    pub refresh_token: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted_device: Option<String>,
}

impl From<IssuedSession> for SessionTokens {
    fn from(issued: IssuedSession) -> Self {
        Self {
            session_id: issued.session_id,
            session_token: issued.session_token,
            refresh_token: issued.refresh_token,
            role: issued.role,
            expires_at: issued.expires_at,
            evicted_device: issued.evicted_device,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub role: Role,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
}

impl From<ValidatedSession> for SessionInfo {
    fn from(valid: ValidatedSession) -> Self {
        Self {
            session_id: valid.session_id,
            owner_id: valid.owner_id,
            role: valid.role,
            device_id: valid.device_id,
            expires_at: valid.expires_at,
        }
    }
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct VerifyParams {
    /// First entry id to verify; defaults to the start of the chain.
    pub start: Option<i64>,
    /// Last entry id to verify; defaults to the chain head.
    pub end: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<i64>,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct ExportParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub actor_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
