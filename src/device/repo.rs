//! Transactional device binding.
//!
//! The read-active / demote-old / upsert-new / revoke-sessions sequence runs
//! under an owner-scoped advisory lock so two racing logins for the same
//! owner serialize: the loser binds strictly after the winner's demotion is
//! durably visible, and a single-device owner never ends up with two active
//! devices.

use anyhow::{Context, Result};
use sqlx::{Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::{decide, BindDecision, BindOutcome};
use crate::audit::{repo as audit_repo, EventType, NewAuditEvent, Severity};
use crate::session::policy::{policy, Role};

/// Bind `device_id` as the owner's device under the role's policy.
///
/// Side effects on eviction: the old device is demoted and every live session
/// bound to it is revoked, all within the caller's transaction. Every outcome
/// appends one audit entry.
pub async fn bind(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    role: Role,
    device_id: &str,
) -> Result<BindOutcome> {
    lock_owner(tx, owner_id).await?;

    // A device actively bound to a different identity is a sharing signal;
    // reject rather than silently dual-home it. No writes happen on this
    // path: the caller rolls the transaction back and audits the rejection
    // standalone so the record survives the rollback.
    if device_claimed_elsewhere(tx, owner_id, device_id).await? {
        return Ok(BindOutcome::Rejected);
    }

    let current_active = if policy(role).single_device {
        active_device(tx, owner_id).await?
    } else {
        None
    };

    let decision = decide(current_active.as_deref(), device_id, policy(role).single_device);

    let outcome = match decision {
        BindDecision::Admit | BindDecision::Keep => BindOutcome::Admitted,
        BindDecision::AdmitEvicting(old_device_id) => {
            demote_device(tx, owner_id, &old_device_id).await?;
            let revoked = revoke_device_sessions(tx, owner_id, &old_device_id).await?;
            let event = NewAuditEvent::anonymous(
                EventType::DeviceEvicted,
                "device",
                &old_device_id,
                Severity::Warning,
                serde_json::json!({
                    "new_device_id": device_id,
                    "old_device_id": old_device_id,
                    "sessions_revoked": revoked,
                }),
            )
            .with_actor(owner_id, role);
            audit_repo::append(tx, &event).await?;
            BindOutcome::Evicted { old_device_id }
        }
    };

    upsert_active(tx, owner_id, device_id).await?;

    let event = NewAuditEvent::anonymous(
        EventType::DeviceAdmitted,
        "device",
        device_id,
        Severity::Info,
        serde_json::json!({ "single_device": policy(role).single_device }),
    )
    .with_actor(owner_id, role);
    audit_repo::append(tx, &event).await?;

    Ok(outcome)
}

/// Record activity on a device without changing its binding state.
pub async fn touch(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    device_id: &str,
) -> Result<()> {
    let query = r"
        UPDATE devices
        SET last_seen_at = NOW()
        WHERE owner_id = $1 AND device_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(owner_id)
        .bind(device_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to touch device")?;
    Ok(())
}

async fn lock_owner(tx: &mut Transaction<'_, Postgres>, owner_id: Uuid) -> Result<()> {
    // hashtext gives a stable int4 key per owner; xact-scoped so the lock
    // releases with the transaction.
    let query = "SELECT pg_advisory_xact_lock(hashtext($1))";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(owner_id.to_string())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to take owner device lock")?;
    Ok(())
}

async fn device_claimed_elsewhere(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    device_id: &str,
) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM devices
        WHERE device_id = $1 AND owner_id <> $2 AND is_active
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(device_id)
        .bind(owner_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check device ownership")?;
    Ok(row.is_some())
}

async fn active_device(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
) -> Result<Option<String>> {
    let query = r"
        SELECT device_id
        FROM devices
        WHERE owner_id = $1 AND is_active
        ORDER BY last_seen_at DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(owner_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to read active device")?;
    Ok(row.map(|row| row.get("device_id")))
}

async fn demote_device(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    device_id: &str,
) -> Result<()> {
    let query = r"
        UPDATE devices
        SET is_active = FALSE
        WHERE owner_id = $1 AND device_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(owner_id)
        .bind(device_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to demote device")?;
    Ok(())
}

async fn revoke_device_sessions(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    device_id: &str,
) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked = TRUE, revoked_at = NOW()
        WHERE owner_id = $1 AND device_id = $2 AND revoked = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(owner_id)
        .bind(device_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to revoke evicted device sessions")?;
    Ok(result.rows_affected())
}

async fn upsert_active(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    device_id: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO devices (owner_id, device_id, first_seen_at, last_seen_at, is_active)
        VALUES ($1, $2, NOW(), NOW(), TRUE)
        ON CONFLICT (owner_id, device_id)
        DO UPDATE SET is_active = TRUE, last_seen_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(owner_id)
        .bind(device_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to upsert device")?;
    Ok(())
}
