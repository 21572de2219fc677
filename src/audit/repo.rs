//! Chain persistence: serialized append, paged verification, forensic export.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::chain::{self, EntryBody, GENESIS_HASH};
use super::models::{AuditRecord, ChainStatus, NewAuditEvent};
use crate::session::policy::Role;

/// Advisory lock key serializing "read last hash, write next entry" across
/// all workers. A single global chain needs a strict total order; this is the
/// one deliberate global serialization point in the system.
const CHAIN_LOCK_KEY: i64 = 0x7669_6769_6c5f_6175;

/// Verification page size; each page is one round trip.
const VERIFY_PAGE_SIZE: i64 = 500;

/// Append one entry to the chain inside the caller's transaction.
///
/// The caller's business writes and the audit record commit or roll back
/// together; a failed append fails the whole operation.
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    event: &NewAuditEvent,
) -> Result<(i64, Vec<u8>)> {
    let query = "SELECT pg_advisory_xact_lock($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(CHAIN_LOCK_KEY)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to take audit chain lock")?;

    let query = "SELECT hash FROM audit_entries ORDER BY entry_id DESC LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let prev_hash: Vec<u8> = sqlx::query(query)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to read audit chain head")?
        .map_or_else(|| GENESIS_HASH.to_vec(), |row| row.get("hash"));

    let created_at = Utc::now();
    let metadata =
        serde_json::to_string(&event.metadata).context("failed to serialize audit metadata")?;
    let body = EntryBody {
        created_at_micros: created_at.timestamp_micros(),
        actor_id: event.actor_id,
        actor_role: event.actor_role.map(Role::as_str),
        session_id: event.session_id,
        event_type: event.event_type.as_str(),
        entity_type: &event.entity_type,
        entity_id: &event.entity_id,
        severity: event.severity.as_str(),
        metadata: &metadata,
    };
    let hash = chain::entry_hash(&body, &prev_hash);

    let query = r"
        INSERT INTO audit_entries
            (created_at, actor_id, actor_role, session_id, event_type,
             entity_type, entity_id, severity, metadata, prev_hash, hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING entry_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(created_at)
        .bind(event.actor_id)
        .bind(event.actor_role.map(Role::as_str))
        .bind(event.session_id)
        .bind(event.event_type.as_str())
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(event.severity.as_str())
        .bind(&metadata)
        .bind(&prev_hash)
        .bind(&hash)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to append audit entry")?;

    Ok((row.get("entry_id"), hash))
}

/// Append a single entry in its own transaction. Used for rejection events
/// where no surrounding business transaction exists.
pub async fn append_standalone(pool: &PgPool, event: &NewAuditEvent) -> Result<(i64, Vec<u8>)> {
    let mut tx = pool.begin().await.context("begin audit transaction")?;
    let appended = append(&mut tx, event).await?;
    tx.commit().await.context("commit audit transaction")?;
    Ok(appended)
}

/// Recompute hashes over `[start, end]` and report the first disagreement.
///
/// Pages through the range so verification of a long chain neither loads it
/// all at once nor holds a transaction open; the stored tail hash of each
/// page carries into the next, which also makes a restart from any cursor
/// sound.
pub async fn verify_range(pool: &PgPool, start: i64, end: i64) -> Result<ChainStatus> {
    let mut cursor = start;
    // From the head of the chain the first entry must link to the genesis
    // sentinel; mid-chain restarts take the first prev_hash on trust.
    let mut carry: Option<Vec<u8>> = (start <= 1).then(|| GENESIS_HASH.to_vec());

    loop {
        let query = r"
            SELECT entry_id, created_at, actor_id, actor_role, session_id,
                   event_type, entity_type, entity_id, severity, metadata,
                   prev_hash, hash
            FROM audit_entries
            WHERE entry_id >= $1 AND entry_id <= $2
            ORDER BY entry_id
            LIMIT $3
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(cursor)
            .bind(end)
            .bind(VERIFY_PAGE_SIZE)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to read audit entries for verification")?;

        if rows.is_empty() {
            return Ok(ChainStatus::Ok);
        }

        let records: Vec<AuditRecord> = rows.iter().map(record_from_row).collect();
        if let Some(entry_id) = chain::verify_segment(&records, carry.as_deref()) {
            return Ok(ChainStatus::BrokenAt(entry_id));
        }

        let last_id = records.last().map_or(end, |record| record.entry_id);
        if last_id >= end || (records.len() as i64) < VERIFY_PAGE_SIZE {
            return Ok(ChainStatus::Ok);
        }
        carry = chain::segment_tail(&records);
        cursor = last_id + 1;
    }
}

/// Filters for the read-only forensic export. Pure projection, not part of
/// the write path.
#[derive(Clone, Debug, Default)]
pub struct ExportFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub actor_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

pub async fn export(pool: &PgPool, filter: &ExportFilter) -> Result<Vec<AuditRecord>> {
    // Fixed limit ceiling keeps the viewer from pulling the whole chain.
    let limit = filter.limit.unwrap_or(200).clamp(1, 1000);
    let query = r"
        SELECT entry_id, created_at, actor_id, actor_role, session_id,
               event_type, entity_type, entity_id, severity, metadata,
               prev_hash, hash
        FROM audit_entries
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
          AND ($3::uuid IS NULL OR actor_id = $3)
          AND ($4::text IS NULL OR event_type = $4)
          AND ($5::text IS NULL OR severity = $5)
        ORDER BY entry_id DESC
        LIMIT $6
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.actor_id)
        .bind(filter.event_type.as_deref())
        .bind(filter.severity.as_deref())
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to export audit entries")?;

    Ok(rows.iter().map(record_from_row).collect())
}

/// Highest entry id currently in the chain, for the viewer's range picker.
pub async fn chain_head(pool: &PgPool) -> Result<Option<i64>> {
    let query = "SELECT MAX(entry_id) AS head FROM audit_entries";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to read audit chain head id")?;
    Ok(row.get("head"))
}

fn record_from_row(row: &PgRow) -> AuditRecord {
    AuditRecord {
        entry_id: row.get("entry_id"),
        created_at: row.get("created_at"),
        actor_id: row.get("actor_id"),
        actor_role: row.get("actor_role"),
        session_id: row.get("session_id"),
        event_type: row.get("event_type"),
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        severity: row.get("severity"),
        metadata: row.get("metadata"),
        prev_hash: row.get("prev_hash"),
        hash: row.get("hash"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_filter_defaults_are_open() {
        let filter = ExportFilter::default();
        assert!(filter.from.is_none());
        assert!(filter.actor_id.is_none());
        assert!(filter.limit.is_none());
    }

    #[test]
    fn chain_lock_key_is_fixed() {
        // The key doubles as a namespace; accidental changes would let two
        // builds interleave appends.
        assert_eq!(CHAIN_LOCK_KEY, 0x7669_6769_6c5f_6175);
    }
}
