//! Credential store access: time-boxed, one-time-consumption code records.
//!
//! Credentials are retained after consumption or expiry; the rolling-window
//! rate limit counts every issuance, consumed or not.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::code::Purpose;

/// Serialize issuance per destination for the count-then-insert sequence.
/// Xact-scoped so the lock releases with the transaction.
pub async fn lock_destination(
    tx: &mut Transaction<'_, Postgres>,
    destination: &str,
) -> Result<()> {
    let query = "SELECT pg_advisory_xact_lock(hashtext($1))";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(destination)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to take destination lock")?;
    Ok(())
}

/// Issuances for a destination within the rolling window, any purpose.
/// Runs inside the issue transaction, after `lock_destination`, so two
/// concurrent issuers cannot both count below the ceiling.
pub async fn count_recent(
    tx: &mut Transaction<'_, Postgres>,
    destination: &str,
    window_seconds: i64,
) -> Result<i64> {
    let query = r"
        SELECT COUNT(*) AS issued
        FROM otp_credentials
        WHERE destination = $1
          AND created_at > NOW() - ($2 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(destination)
        .bind(window_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to count recent credentials")?;
    Ok(row.get("issued"))
}

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    destination: &str,
    purpose: Purpose,
    code_hash: &[u8],
    ttl_seconds: i64,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO otp_credentials (credential_id, destination, purpose, code_hash, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
        RETURNING credential_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(destination)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(ttl_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert credential")?;
    Ok(row.get("credential_id"))
}

/// Consume the newest live credential if its hash matches.
///
/// Only the most recently issued unconsumed credential is comparable:
/// re-requesting a code supersedes earlier ones, so an older code fails even
/// while unexpired. Single conditional update: of two concurrent verifies,
/// exactly one sees a row transition and the other observes it already
/// consumed. Wrong code, superseded, expired, and consumed all look identical
/// to the caller (zero rows).
pub async fn consume(
    tx: &mut Transaction<'_, Postgres>,
    destination: &str,
    purpose: Purpose,
    code_hash: &[u8],
) -> Result<Option<Uuid>> {
    let query = r"
        UPDATE otp_credentials
        SET consumed_at = NOW()
        WHERE credential_id = (
                SELECT credential_id
                FROM otp_credentials
                WHERE destination = $1
                  AND purpose = $2
                  AND consumed_at IS NULL
                  AND expires_at > NOW()
                ORDER BY created_at DESC, credential_id DESC
                LIMIT 1
            )
          AND code_hash = $3
        RETURNING credential_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(destination)
        .bind(purpose.as_str())
        .bind(code_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume credential")?;
    Ok(row.map(|row| row.get("credential_id")))
}

/// Compensating delete after a failed dispatch, so no valid-but-undelivered
/// code lingers in the store.
pub async fn delete(pool: &PgPool, credential_id: Uuid) -> Result<()> {
    let query = "DELETE FROM otp_credentials WHERE credential_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(credential_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete undelivered credential")?;
    Ok(())
}
