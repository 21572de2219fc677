//! OTP issuer/verifier and the credential redemption flow.

use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

use super::code::{
    generate_code, hash_code, normalize_destination, plausible_code, redacted_destination,
    valid_destination, Purpose,
};
use super::repo;
use crate::audit::{repo as audit_repo, EventType, NewAuditEvent, Severity};
use crate::config::TrustConfig;
use crate::delivery::{CodeMessage, CodeSender};
use crate::device::valid_device_id;
use crate::errors::AuthError;
use crate::profile::ProfileDirectory;
use crate::session::{IssuedSession, SessionService};

#[derive(Clone)]
pub struct OtpService {
    pool: PgPool,
    config: TrustConfig,
    sender: Arc<dyn CodeSender>,
    profiles: Arc<dyn ProfileDirectory>,
    sessions: SessionService,
}

impl OtpService {
    #[must_use]
    pub fn new(
        pool: PgPool,
        config: TrustConfig,
        sender: Arc<dyn CodeSender>,
        profiles: Arc<dyn ProfileDirectory>,
        sessions: SessionService,
    ) -> Self {
        Self {
            pool,
            config,
            sender,
            profiles,
            sessions,
        }
    }

    /// Issue a one-time code to a destination.
    ///
    /// The credential row and its audit entry commit before dispatch; a
    /// failed dispatch compensates by deleting the credential so no
    /// valid-but-undelivered code lingers.
    pub async fn issue(&self, destination: &str, purpose: Purpose) -> Result<(), AuthError> {
        let destination = normalize_destination(destination);
        if !valid_destination(&destination) {
            return Err(AuthError::InvalidDestination);
        }

        let mut tx = self.pool.begin().await.context("begin issue transaction")?;

        // Count and insert run under a destination-scoped lock in one
        // transaction; two concurrent issuers at ceiling minus one cannot
        // both pass the count.
        repo::lock_destination(&mut tx, &destination).await?;
        let issued = repo::count_recent(
            &mut tx,
            &destination,
            self.config.otp_rate_window_seconds(),
        )
        .await?;
        if issued >= self.config.otp_rate_ceiling() {
            drop(tx);
            let event = NewAuditEvent::anonymous(
                EventType::OtpRejected,
                "credential",
                &redacted_destination(&destination),
                Severity::Warning,
                serde_json::json!({ "reason": "rate_limited", "issued_in_window": issued }),
            );
            audit_repo::append_standalone(&self.pool, &event).await?;
            return Err(AuthError::RateLimited);
        }

        let code = generate_code()?;
        let code_hash = hash_code(&destination, purpose, &code);

        let credential_id = repo::insert(
            &mut tx,
            &destination,
            purpose,
            &code_hash,
            self.config.otp_ttl_seconds(),
        )
        .await?;
        let event = NewAuditEvent::anonymous(
            EventType::OtpIssued,
            "credential",
            &credential_id.to_string(),
            Severity::Info,
            serde_json::json!({
                "destination": redacted_destination(&destination),
                "purpose": purpose.as_str(),
            }),
        );
        audit_repo::append(&mut tx, &event).await?;
        tx.commit().await.context("commit issue transaction")?;

        let message = CodeMessage {
            destination: destination.clone(),
            purpose,
            code,
        };
        if let Err(err) = self.sender.send(&message).await {
            repo::delete(&self.pool, credential_id).await?;
            let event = NewAuditEvent::anonymous(
                EventType::OtpDispatchFailed,
                "credential",
                &credential_id.to_string(),
                Severity::Warning,
                serde_json::json!({ "destination": redacted_destination(&destination) }),
            );
            audit_repo::append_standalone(&self.pool, &event).await?;
            return Err(AuthError::Internal(
                err.context("failed to dispatch one-time code"),
            ));
        }

        Ok(())
    }

    /// Redeem a code into a session.
    ///
    /// Consumption, the admin second-code check, device binding, session
    /// insert, and their audit entries all run in one transaction: a code is
    /// never left consumed with no session to show for it.
    pub async fn redeem(
        &self,
        destination: &str,
        code: &str,
        second_code: Option<&str>,
        device_id: &str,
    ) -> Result<IssuedSession, AuthError> {
        let destination = normalize_destination(destination);
        if !valid_destination(&destination) {
            return Err(AuthError::InvalidDestination);
        }
        // Malformed inputs are rejected before any state change or audit
        // work; only attempts against real records get chain entries.
        if !plausible_code(code) {
            return Err(AuthError::OtpInvalid);
        }
        if !valid_device_id(device_id) {
            return Err(AuthError::DeviceRejected);
        }

        let Some(profile) = self.profiles.resolve(&destination).await? else {
            self.audit_otp_rejected(&destination, "unknown_destination")
                .await?;
            return Err(AuthError::OtpInvalid);
        };

        let mut tx = self.pool.begin().await.context("begin redeem transaction")?;

        let code_hash = hash_code(&destination, Purpose::Login, code);
        let Some(credential_id) =
            repo::consume(&mut tx, &destination, Purpose::Login, &code_hash).await?
        else {
            drop(tx);
            self.audit_otp_rejected(&destination, "invalid_code").await?;
            return Err(AuthError::OtpInvalid);
        };

        if crate::session::policy::policy(profile.role).second_code_required {
            let confirmed = match second_code {
                Some(second) if plausible_code(second) => {
                    let second_hash = hash_code(&destination, Purpose::AdminConfirm, second);
                    repo::consume(&mut tx, &destination, Purpose::AdminConfirm, &second_hash)
                        .await?
                        .is_some()
                }
                _ => false,
            };
            if !confirmed {
                // Roll back so the login code is not burned by a missing
                // confirmation; the error stays uniform.
                tx.rollback()
                    .await
                    .context("rollback unconfirmed admin redeem")?;
                self.audit_otp_rejected(&destination, "second_code_required")
                    .await?;
                return Err(AuthError::OtpInvalid);
            }
        }

        let event = NewAuditEvent::anonymous(
            EventType::OtpVerified,
            "credential",
            &credential_id.to_string(),
            Severity::Info,
            serde_json::json!({ "destination": redacted_destination(&destination) }),
        )
        .with_actor(profile.owner_id, profile.role);
        audit_repo::append(&mut tx, &event).await?;

        let issued = match self
            .sessions
            .create_in_tx(&mut tx, profile.owner_id, profile.role, device_id)
            .await
        {
            Ok(issued) => issued,
            Err(AuthError::DeviceRejected) => {
                tx.rollback()
                    .await
                    .context("rollback device-rejected redeem")?;
                let event = NewAuditEvent::anonymous(
                    EventType::DeviceRejected,
                    "device",
                    device_id,
                    Severity::Warning,
                    serde_json::json!({ "reason": "active_for_other_owner" }),
                )
                .with_actor(profile.owner_id, profile.role);
                audit_repo::append_standalone(&self.pool, &event).await?;
                return Err(AuthError::DeviceRejected);
            }
            Err(err) => return Err(err),
        };

        tx.commit().await.context("commit redeem transaction")?;
        Ok(issued)
    }

    async fn audit_otp_rejected(
        &self,
        destination: &str,
        reason: &str,
    ) -> Result<(), AuthError> {
        let event = NewAuditEvent::anonymous(
            EventType::OtpRejected,
            "credential",
            &redacted_destination(destination),
            Severity::Warning,
            serde_json::json!({ "reason": reason }),
        );
        audit_repo::append_standalone(&self.pool, &event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::RecordingSender;
    use crate::profile::testing::StaticProfileDirectory;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> Result<OtpService> {
        // Lazy pool: these tests only exercise paths that reject before any
        // database work.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let config = TrustConfig::new();
        let sessions = SessionService::new(pool.clone(), config.clone());
        Ok(OtpService::new(
            pool,
            config,
            Arc::new(RecordingSender::new(false)),
            Arc::new(StaticProfileDirectory::new([])),
            sessions,
        ))
    }

    #[tokio::test]
    async fn issue_rejects_malformed_destination() -> Result<()> {
        let service = service()?;
        let result = service.issue("not-a-number", Purpose::Login).await;
        assert!(matches!(result, Err(AuthError::InvalidDestination)));
        Ok(())
    }

    #[tokio::test]
    async fn redeem_rejects_malformed_code_before_storage() -> Result<()> {
        let service = service()?;
        let result = service
            .redeem("+919876543210", "12-456", None, "dev-1")
            .await;
        assert!(matches!(result, Err(AuthError::OtpInvalid)));
        Ok(())
    }

    #[tokio::test]
    async fn redeem_rejects_malformed_device_id() -> Result<()> {
        let service = service()?;
        let result = service.redeem("+919876543210", "123456", None, "").await;
        assert!(matches!(result, Err(AuthError::DeviceRejected)));
        Ok(())
    }
}
