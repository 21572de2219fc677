//! Static role -> policy table.
//!
//! The only role-specific numeric policy in the system lives here. Adding a
//! role is a data change in this table, not a code change elsewhere.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Technician,
    Staff,
    Admin,
    Transporter,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Technician => "technician",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::Transporter => "transporter",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Self::Customer),
            "technician" => Some(Self::Technician),
            "staff" => Some(Self::Staff),
            "admin" => Some(Self::Admin),
            "transporter" => Some(Self::Transporter),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RolePolicy {
    /// Session lifetime before a refresh is required.
    pub session_ttl_seconds: i64,
    /// At most one active device per owner when set.
    pub single_device: bool,
    /// Login requires a second time-boxed code (`admin_confirm` purpose).
    pub second_code_required: bool,
}

/// Role-indexed policy table. Customer-class roles get short sessions;
/// staff/admin-class roles progressively longer ones. Field roles that share
/// hardware (technician, transporter) are device-bound to contain account
/// sharing, as is admin.
#[must_use]
pub const fn policy(role: Role) -> RolePolicy {
    match role {
        Role::Customer => RolePolicy {
            session_ttl_seconds: 30 * 60,
            single_device: false,
            second_code_required: false,
        },
        Role::Transporter => RolePolicy {
            session_ttl_seconds: 60 * 60,
            single_device: true,
            second_code_required: false,
        },
        Role::Technician => RolePolicy {
            session_ttl_seconds: 8 * 60 * 60,
            single_device: true,
            second_code_required: false,
        },
        Role::Staff => RolePolicy {
            session_ttl_seconds: 12 * 60 * 60,
            single_device: false,
            second_code_required: false,
        },
        Role::Admin => RolePolicy {
            session_ttl_seconds: 24 * 60 * 60,
            single_device: true,
            second_code_required: true,
        },
    }
}
