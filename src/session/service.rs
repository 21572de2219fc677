//! Session manager: the state machine over the session store.
//!
//! Only writer of the session store and only caller of the device registry's
//! binding enforcement. Every state transition appends to the audit chain in
//! the same transaction; the accept path of validation is deliberately not
//! audited to keep the chain from bloating under request-rate traffic.

use anyhow::Context;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{IssuedSession, SessionState, ValidatedSession};
use super::policy::{policy, Role};
use super::repo::{self, NewSession};
use super::token::{generate_token, hash_token, redacted_token_ref};
use crate::audit::{repo as audit_repo, EventType, NewAuditEvent, Severity};
use crate::config::TrustConfig;
use crate::device::{self, BindOutcome};
use crate::errors::AuthError;

#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    config: TrustConfig,
}

impl SessionService {
    #[must_use]
    pub fn new(pool: PgPool, config: TrustConfig) -> Self {
        Self { pool, config }
    }

    /// Mint a session inside the caller's transaction, so credential
    /// consumption, device binding, session insert, and audit commit or roll
    /// back as one unit.
    pub(crate) async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: Uuid,
        role: Role,
        device_id: &str,
    ) -> Result<IssuedSession, AuthError> {
        let outcome = device::repo::bind(tx, owner_id, role, device_id).await?;
        let evicted_device = match outcome {
            BindOutcome::Rejected => return Err(AuthError::DeviceRejected),
            BindOutcome::Admitted => None,
            BindOutcome::Evicted { old_device_id } => Some(old_device_id),
        };

        let session_id = Uuid::new_v4();
        let session_token = generate_token()?;
        let refresh_token = generate_token()?;
        let now = Utc::now();
        let expires_at = now + Duration::seconds(policy(role).session_ttl_seconds);

        repo::insert(
            tx,
            &NewSession {
                session_id,
                owner_id,
                role,
                device_id,
                token_hash: &hash_token(&session_token),
                refresh_token_hash: &hash_token(&refresh_token),
                created_at: now,
                expires_at,
                lineage_started_at: now,
                supersedes: None,
            },
        )
        .await?;

        let event = NewAuditEvent::anonymous(
            EventType::SessionCreated,
            "session",
            &session_id.to_string(),
            Severity::Info,
            serde_json::json!({
                "device_id": device_id,
                "evicted_device": evicted_device,
            }),
        )
        .with_actor(owner_id, role)
        .with_session(session_id);
        audit_repo::append(tx, &event).await?;

        Ok(IssuedSession {
            session_id,
            owner_id,
            role,
            device_id: device_id.to_string(),
            session_token,
            refresh_token,
            expires_at,
            evicted_device,
        })
    }

    /// Validate a presented bearer. Pure read on the accept path; rejections
    /// are audited.
    pub async fn validate(&self, bearer: &str) -> Result<ValidatedSession, AuthError> {
        let token_hash = hash_token(bearer);
        let Some(record) = repo::lookup_by_token_hash(&self.pool, &token_hash).await? else {
            self.audit_rejection(
                None,
                &redacted_token_ref(bearer),
                "session_not_found",
            )
            .await?;
            return Err(AuthError::SessionNotFound);
        };

        match record.state(Utc::now()) {
            SessionState::Revoked => {
                self.audit_rejection(
                    Some(&record),
                    &record.session_id.to_string(),
                    "session_revoked",
                )
                .await?;
                Err(AuthError::SessionRevoked)
            }
            SessionState::Expired => {
                // Callers are expected to attempt a refresh, not treat this
                // as fatal.
                self.audit_rejection(
                    Some(&record),
                    &record.session_id.to_string(),
                    "session_expired",
                )
                .await?;
                Err(AuthError::SessionExpired)
            }
            SessionState::Active => {
                let mut tx = self.pool.begin().await.context("begin touch transaction")?;
                device::repo::touch(&mut tx, record.owner_id, &record.device_id).await?;
                tx.commit().await.context("commit touch transaction")?;
                Ok(ValidatedSession {
                    session_id: record.session_id,
                    owner_id: record.owner_id,
                    role: record.role,
                    device_id: record.device_id,
                    expires_at: record.expires_at,
                })
            }
        }
    }

    /// Rotate a refresh token: revoke the old session, mint a successor in
    /// the same transaction. A replayed (already-rotated) token claims zero
    /// rows and fails, which is how token theft surfaces.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, AuthError> {
        let refresh_hash = hash_token(refresh_token);
        let mut tx = self.pool.begin().await.context("begin refresh transaction")?;

        let Some(old) = repo::claim_refresh(&mut tx, &refresh_hash).await? else {
            drop(tx);
            self.audit_rejection(
                None,
                &redacted_token_ref(refresh_token),
                "invalid_refresh_token",
            )
            .await?;
            return Err(AuthError::InvalidRefreshToken);
        };

        let now = Utc::now();
        let lineage_age = now - old.lineage_started_at;
        if lineage_age > Duration::seconds(self.config.refresh_lineage_max_seconds()) {
            // Rotation extends session life, but not indefinitely. Roll the
            // claim back; the lineage check will keep failing regardless.
            tx.rollback()
                .await
                .context("rollback expired-lineage refresh")?;
            self.audit_rejection(
                Some(&old),
                &old.session_id.to_string(),
                "refresh_lineage_expired",
            )
            .await?;
            return Err(AuthError::RefreshExpired);
        }

        let session_id = Uuid::new_v4();
        let session_token = generate_token()?;
        let new_refresh_token = generate_token()?;
        let expires_at = now + Duration::seconds(policy(old.role).session_ttl_seconds);

        repo::insert(
            &mut tx,
            &NewSession {
                session_id,
                owner_id: old.owner_id,
                role: old.role,
                device_id: &old.device_id,
                token_hash: &hash_token(&session_token),
                refresh_token_hash: &hash_token(&new_refresh_token),
                created_at: now,
                expires_at,
                lineage_started_at: old.lineage_started_at,
                supersedes: Some(old.session_id),
            },
        )
        .await?;

        let event = NewAuditEvent::anonymous(
            EventType::SessionRefreshed,
            "session",
            &session_id.to_string(),
            Severity::Info,
            serde_json::json!({
                "old_session_id": old.session_id,
                "new_session_id": session_id,
            }),
        )
        .with_actor(old.owner_id, old.role)
        .with_session(session_id);
        audit_repo::append(&mut tx, &event).await?;

        tx.commit().await.context("commit refresh transaction")?;

        Ok(IssuedSession {
            session_id,
            owner_id: old.owner_id,
            role: old.role,
            device_id: old.device_id,
            session_token,
            refresh_token: new_refresh_token,
            expires_at,
            evicted_device: None,
        })
    }

    /// Revoke the session behind a bearer. Idempotent: revoking an
    /// already-revoked or unknown session is a no-op success.
    pub async fn revoke(&self, bearer: &str) -> Result<(), AuthError> {
        let token_hash = hash_token(bearer);
        let mut tx = self.pool.begin().await.context("begin revoke transaction")?;

        if let Some(record) = repo::revoke_by_token_hash(&mut tx, &token_hash).await? {
            let event = NewAuditEvent::anonymous(
                EventType::SessionRevoked,
                "session",
                &record.session_id.to_string(),
                Severity::Info,
                serde_json::json!({ "device_id": record.device_id }),
            )
            .with_actor(record.owner_id, record.role)
            .with_session(record.session_id);
            audit_repo::append(&mut tx, &event).await?;
        }

        tx.commit().await.context("commit revoke transaction")?;
        Ok(())
    }

    async fn audit_rejection(
        &self,
        record: Option<&super::models::SessionRecord>,
        entity_id: &str,
        reason: &str,
    ) -> Result<(), AuthError> {
        let mut event = NewAuditEvent::anonymous(
            EventType::SessionRejected,
            "session",
            entity_id,
            Severity::Warning,
            serde_json::json!({ "reason": reason }),
        );
        if let Some(record) = record {
            event = event
                .with_actor(record.owner_id, record.role)
                .with_session(record.session_id);
        }
        audit_repo::append_standalone(&self.pool, &event).await?;
        Ok(())
    }
}
