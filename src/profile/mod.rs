//! Role resolution collaborator.
//!
//! The profile store is external to this core; roles are authoritative input,
//! immutable for the lifetime of a session. The default implementation reads
//! the back office's `profiles` table, but the engine only depends on the
//! trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::session::policy::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Profile {
    pub owner_id: Uuid,
    pub role: Role,
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Resolve the identity and role registered for a destination address.
    async fn resolve(&self, destination: &str) -> Result<Option<Profile>>;
}

/// Directory backed by the back office's profile table.
#[derive(Clone)]
pub struct PgProfileDirectory {
    pool: PgPool,
}

impl PgProfileDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileDirectory for PgProfileDirectory {
    async fn resolve(&self, destination: &str) -> Result<Option<Profile>> {
        let query = r"
            SELECT owner_id, role
            FROM profiles
            WHERE destination = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(destination)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to resolve profile")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.get("role");
        let Some(role) = Role::parse(&role) else {
            // An unknown role is a profile-store problem, not a reason to
            // admit with a guessed policy.
            return Ok(None);
        };
        Ok(Some(Profile {
            owner_id: row.get("owner_id"),
            role,
        }))
    }
}
