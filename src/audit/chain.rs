//! Canonical entry hashing and chain verification.
//!
//! `hash = SHA-256(canonical_body || prev_hash)`. The canonical body is a
//! length-prefixed field encoding, so no field boundary ambiguity exists and
//! recomputation from stored columns is byte-exact. The first entry links to
//! an all-zero sentinel.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::models::AuditRecord;

pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// The hashed portion of an entry, borrowed from either a `NewAuditEvent`
/// about to be appended or an `AuditRecord` being re-verified.
#[derive(Debug)]
pub struct EntryBody<'a> {
    pub created_at_micros: i64,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<&'a str>,
    pub session_id: Option<Uuid>,
    pub event_type: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub severity: &'a str,
    pub metadata: &'a str,
}

impl<'a> EntryBody<'a> {
    #[must_use]
    pub fn from_record(record: &'a AuditRecord) -> Self {
        Self {
            created_at_micros: record.created_at.timestamp_micros(),
            actor_id: record.actor_id,
            actor_role: record.actor_role.as_deref(),
            session_id: record.session_id,
            event_type: &record.event_type,
            entity_type: &record.entity_type,
            entity_id: &record.entity_id,
            severity: &record.severity,
            metadata: &record.metadata,
        }
    }
}

fn put_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn put_optional(hasher: &mut Sha256, bytes: Option<&[u8]>) {
    match bytes {
        Some(bytes) => {
            hasher.update([1u8]);
            put_field(hasher, bytes);
        }
        None => hasher.update([0u8]),
    }
}

/// Compute an entry hash over the canonical body and the predecessor hash.
#[must_use]
pub fn entry_hash(body: &EntryBody<'_>, prev_hash: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    put_field(&mut hasher, &body.created_at_micros.to_be_bytes());
    put_optional(&mut hasher, body.actor_id.as_ref().map(|id| &id.as_bytes()[..]));
    put_optional(&mut hasher, body.actor_role.map(str::as_bytes));
    put_optional(
        &mut hasher,
        body.session_id.as_ref().map(|id| &id.as_bytes()[..]),
    );
    put_field(&mut hasher, body.event_type.as_bytes());
    put_field(&mut hasher, body.entity_type.as_bytes());
    put_field(&mut hasher, body.entity_id.as_bytes());
    put_field(&mut hasher, body.severity.as_bytes());
    put_field(&mut hasher, body.metadata.as_bytes());
    hasher.update(prev_hash);
    hasher.finalize().to_vec()
}

/// Verify a contiguous segment of stored records.
///
/// `carry` is the stored hash of the entry immediately before the segment,
/// if the caller has it; when absent (a verification restarted mid-chain) the
/// first record's stored `prev_hash` is taken on trust and only recomputation
/// plus forward linkage are checked. Returns the first broken `entry_id`.
#[must_use]
pub fn verify_segment(records: &[AuditRecord], carry: Option<&[u8]>) -> Option<i64> {
    let mut prev: Option<Vec<u8>> = carry.map(<[u8]>::to_vec);
    for record in records {
        if let Some(prev_hash) = &prev {
            if record.prev_hash != *prev_hash {
                return Some(record.entry_id);
            }
        }
        let expected = entry_hash(&EntryBody::from_record(record), &record.prev_hash);
        if expected != record.hash {
            return Some(record.entry_id);
        }
        prev = Some(record.hash.clone());
    }
    None
}

/// Stored hash of the last record in a segment, for carrying across pages.
#[must_use]
pub fn segment_tail(records: &[AuditRecord]) -> Option<Vec<u8>> {
    records.last().map(|record| record.hash.clone())
}
