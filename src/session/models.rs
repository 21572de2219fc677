//! Session records and the pure state classification.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::policy::Role;

/// Durable session row as read from the store.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub role: Role,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Creation time of the first session in this refresh lineage; rotation
    /// inherits it, so lineage age is measured from first issuance.
    pub lineage_started_at: DateTime<Utc>,
    pub revoked: bool,
}

/// Session lifecycle states. `Revoked` wins over `Expired`: a revoked session
/// is terminal no matter what its clock says.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
}

#[must_use]
pub fn classify(revoked: bool, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> SessionState {
    if revoked {
        SessionState::Revoked
    } else if expires_at <= now {
        SessionState::Expired
    } else {
        SessionState::Active
    }
}

impl SessionRecord {
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        classify(self.revoked, self.expires_at, now)
    }
}

/// A freshly minted session. The raw tokens appear here exactly once and are
/// never persisted or logged.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub role: Role,
    pub device_id: String,
    pub session_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    /// Device demoted by this login, when the binding policy evicted one.
    pub evicted_device: Option<String>,
}

/// Answer to "is this bearer authorized, as whom, on which device".
#[derive(Clone, Debug)]
pub struct ValidatedSession {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub role: Role,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn classify_active() {
        let now = Utc::now();
        assert_eq!(
            classify(false, now + Duration::minutes(5), now),
            SessionState::Active
        );
    }

    #[test]
    fn classify_expired_at_boundary() {
        let now = Utc::now();
        assert_eq!(classify(false, now, now), SessionState::Expired);
        assert_eq!(
            classify(false, now - Duration::seconds(1), now),
            SessionState::Expired
        );
    }

    #[test]
    fn revoked_is_terminal_even_if_unexpired() {
        let now = Utc::now();
        assert_eq!(
            classify(true, now + Duration::hours(1), now),
            SessionState::Revoked
        );
    }
}
