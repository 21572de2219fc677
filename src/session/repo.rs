//! Session store access. Sessions are never deleted; revocation and rotation
//! leave terminal rows behind for forensic replay.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::models::SessionRecord;
use super::policy::Role;

const SESSION_COLUMNS: &str = r"session_id, owner_id, role, device_id,
               created_at, expires_at, lineage_started_at, revoked";

pub struct NewSession<'a> {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub role: Role,
    pub device_id: &'a str,
    pub token_hash: &'a [u8],
    pub refresh_token_hash: &'a [u8],
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub lineage_started_at: DateTime<Utc>,
    /// Predecessor in the refresh lineage, if this session was rotated in.
    pub supersedes: Option<Uuid>,
}

pub async fn insert(tx: &mut Transaction<'_, Postgres>, session: &NewSession<'_>) -> Result<()> {
    let query = r"
        INSERT INTO sessions
            (session_id, owner_id, role, device_id, token_hash, refresh_token_hash,
             created_at, expires_at, lineage_started_at, supersedes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session.session_id)
        .bind(session.owner_id)
        .bind(session.role.as_str())
        .bind(session.device_id)
        .bind(session.token_hash)
        .bind(session.refresh_token_hash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.lineage_started_at)
        .bind(session.supersedes)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(())
}

pub async fn lookup_by_token_hash(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = format!(
        r"
        SELECT {SESSION_COLUMNS}
        FROM sessions
        WHERE token_hash = $1
        LIMIT 1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;
    row.as_ref().map(record_from_row).transpose()
}

/// Atomically claim a refresh token: flip the owning session to revoked and
/// return it. Exactly one of two racing calls gets a row back; the other
/// observes zero rows and fails as a replay.
pub async fn claim_refresh(
    tx: &mut Transaction<'_, Postgres>,
    refresh_token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = format!(
        r"
        UPDATE sessions
        SET revoked = TRUE, revoked_at = NOW()
        WHERE refresh_token_hash = $1 AND revoked = FALSE
        RETURNING {SESSION_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(refresh_token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to claim refresh token")?;
    row.as_ref().map(record_from_row).transpose()
}

/// Revoke by bearer token hash. Returns the session only on the
/// unrevoked -> revoked transition; revoking an already-terminal session is a
/// no-op and returns `None`.
pub async fn revoke_by_token_hash(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = format!(
        r"
        UPDATE sessions
        SET revoked = TRUE, revoked_at = NOW()
        WHERE token_hash = $1 AND revoked = FALSE
        RETURNING {SESSION_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to revoke session")?;
    row.as_ref().map(record_from_row).transpose()
}

fn record_from_row(row: &PgRow) -> Result<SessionRecord> {
    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in session store"))?;
    Ok(SessionRecord {
        session_id: row.get("session_id"),
        owner_id: row.get("owner_id"),
        role,
        device_id: row.get("device_id"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        lineage_started_at: row.get("lineage_started_at"),
        revoked: row.get("revoked"),
    })
}
