//! Device registry: per-owner device records and single-device binding.
//!
//! For binding-restricted roles at most one device per owner is active at any
//! instant. The policy decision favors "latest login wins" over protecting the
//! incumbent device: the business need is fraud and account-sharing
//! containment, not availability for whoever logged in first.

pub mod repo;

/// Outcome of a bind, reported to the session manager and the audit chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindOutcome {
    Admitted,
    Evicted { old_device_id: String },
    Rejected,
}

/// Pure decision point, separated from the transactional plumbing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BindDecision {
    /// No conflicting active device; admit the candidate.
    Admit,
    /// A different device is active; admit the candidate and demote the old.
    AdmitEvicting(String),
    /// Candidate is already the active device.
    Keep,
}

pub(crate) fn decide(
    current_active: Option<&str>,
    candidate: &str,
    single_device: bool,
) -> BindDecision {
    if !single_device {
        return BindDecision::Admit;
    }
    match current_active {
        None => BindDecision::Admit,
        Some(active) if active == candidate => BindDecision::Keep,
        Some(active) => BindDecision::AdmitEvicting(active.to_string()),
    }
}

/// Shape check on caller-supplied device identifiers, applied before any
/// storage work.
#[must_use]
pub fn valid_device_id(device_id: &str) -> bool {
    !device_id.is_empty()
        && device_id.len() <= 128
        && device_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' || b == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_device_roles_always_admit() {
        assert_eq!(decide(Some("dev-a"), "dev-b", false), BindDecision::Admit);
        assert_eq!(decide(None, "dev-b", false), BindDecision::Admit);
    }

    #[test]
    fn first_device_is_admitted() {
        assert_eq!(decide(None, "dev-a", true), BindDecision::Admit);
    }

    #[test]
    fn same_device_is_kept() {
        assert_eq!(decide(Some("dev-a"), "dev-a", true), BindDecision::Keep);
    }

    #[test]
    fn latest_login_wins_and_evicts() {
        assert_eq!(
            decide(Some("dev-a"), "dev-b", true),
            BindDecision::AdmitEvicting("dev-a".to_string())
        );
    }

    #[test]
    fn device_id_shape() {
        assert!(valid_device_id("android:9f8e7d6c"));
        assert!(valid_device_id("ios-device_1.2"));
        assert!(!valid_device_id(""));
        assert!(!valid_device_id("dev a"));
        assert!(!valid_device_id(&"x".repeat(129)));
    }
}
