//! Audit chain record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::policy::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OtpIssued,
    OtpDispatchFailed,
    OtpVerified,
    OtpRejected,
    DeviceAdmitted,
    DeviceEvicted,
    DeviceRejected,
    SessionCreated,
    SessionRejected,
    SessionRefreshed,
    SessionRevoked,
    ChainBroken,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OtpIssued => "otp_issued",
            Self::OtpDispatchFailed => "otp_dispatch_failed",
            Self::OtpVerified => "otp_verified",
            Self::OtpRejected => "otp_rejected",
            Self::DeviceAdmitted => "device_admitted",
            Self::DeviceEvicted => "device_evicted",
            Self::DeviceRejected => "device_rejected",
            Self::SessionCreated => "session_created",
            Self::SessionRejected => "session_rejected",
            Self::SessionRefreshed => "session_refreshed",
            Self::SessionRevoked => "session_revoked",
            Self::ChainBroken => "chain_broken",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Event handed to the chain for appending. Callers never supply hashes or
/// timestamps; the chain is the single point of hash computation.
#[derive(Clone, Debug)]
pub struct NewAuditEvent {
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<Role>,
    pub session_id: Option<Uuid>,
    pub event_type: EventType,
    pub entity_type: String,
    pub entity_id: String,
    pub severity: Severity,
    pub metadata: serde_json::Value,
}

impl NewAuditEvent {
    /// Minimal event with no actor attribution (pre-authentication flows).
    #[must_use]
    pub fn anonymous(
        event_type: EventType,
        entity_type: &str,
        entity_id: &str,
        severity: Severity,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            actor_id: None,
            actor_role: None,
            session_id: None,
            event_type,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            severity,
            metadata,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: Uuid, actor_role: Role) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_role = Some(actor_role);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// A stored chain entry, as read back for verification and export.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct AuditRecord {
    pub entry_id: i64,
    pub created_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<String>,
    pub session_id: Option<Uuid>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub severity: String,
    /// Exact serialized JSON text as hashed at append time.
    pub metadata: String,
    #[serde(skip)]
    pub prev_hash: Vec<u8>,
    #[serde(skip)]
    pub hash: Vec<u8>,
}

/// Outcome of a chain verification pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Ok,
    BrokenAt(i64),
}
