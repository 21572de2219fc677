//! Append-only, hash-linked audit chain.
//!
//! One global chain covers the whole security surface: OTP issuance and
//! verification, device binding decisions, and every session transition.
//! Entries are never mutated or deleted; the forensic viewer consumes a
//! read-only export and an integrity verification endpoint.

pub mod chain;
pub mod models;
pub mod repo;

pub use models::{AuditRecord, ChainStatus, EventType, NewAuditEvent, Severity};
