//! Storage-backed integration tests for the trust engine.
//!
//! These run against a real Postgres and are skipped unless `VIGIL_TEST_DSN`
//! points at one (for example `postgres://postgres@localhost/vigil_test`).
//! The schema is applied once per test run; every test works on its own
//! destinations, owners, and devices so the suite can run concurrently
//! against a shared database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::to_bytes,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::{
    env,
    sync::{Arc, Mutex},
};
use tokio::sync::OnceCell;
use uuid::Uuid;
use vigil::{
    api::handlers::audit::verify,
    api::handlers::types::{VerifyParams, VerifyResponse},
    audit::{repo as audit_repo, ChainStatus, EventType, NewAuditEvent, Severity},
    config::TrustConfig,
    delivery::{CodeMessage, CodeSender},
    errors::AuthError,
    otp::{OtpService, Purpose},
    profile::PgProfileDirectory,
    session::{IssuedSession, Role, SessionService},
};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/01_vigil.sql"));

static POOL: OnceCell<PgPool> = OnceCell::const_new();

async fn pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = env::var("VIGIL_TEST_DSN") else {
        return Ok(None);
    };
    let pool = POOL
        .get_or_try_init(|| async {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&dsn)
                .await
                .context("Failed to connect to test database")?;
            sqlx::raw_sql(SCHEMA_SQL)
                .execute(&pool)
                .await
                .context("Failed to apply schema")?;
            anyhow::Ok(pool)
        })
        .await?;
    Ok(Some(pool.clone()))
}

/// Sender that keeps the dispatched codes so tests can redeem them.
struct CapturingSender {
    sent: Mutex<Vec<CodeMessage>>,
}

impl CapturingSender {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn codes(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sender mutex poisoned")
            .iter()
            .map(|message| message.code.clone())
            .collect()
    }
}

#[async_trait]
impl CodeSender for CapturingSender {
    async fn send(&self, message: &CodeMessage) -> Result<()> {
        self.sent
            .lock()
            .expect("sender mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

fn engine(pool: &PgPool, sender: Arc<CapturingSender>) -> (OtpService, SessionService) {
    let config = TrustConfig::new();
    let sessions = SessionService::new(pool.clone(), config.clone());
    let otp = OtpService::new(
        pool.clone(),
        config,
        sender,
        Arc::new(PgProfileDirectory::new(pool.clone())),
        sessions.clone(),
    );
    (otp, sessions)
}

fn unique_destination() -> String {
    let digits = Uuid::new_v4().as_u128() % 10_000_000_000;
    format!("+91{digits:010}")
}

fn unique_device(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

async fn seed_profile(pool: &PgPool, destination: &str, role: Role) -> Result<Uuid> {
    let owner_id = Uuid::new_v4();
    sqlx::query("INSERT INTO profiles (owner_id, destination, role) VALUES ($1, $2, $3)")
        .bind(owner_id)
        .bind(destination)
        .bind(role.as_str())
        .execute(pool)
        .await
        .context("Failed to seed profile")?;
    Ok(owner_id)
}

async fn login(
    otp: &OtpService,
    sender: &CapturingSender,
    destination: &str,
    device_id: &str,
) -> Result<IssuedSession> {
    otp.issue(destination, Purpose::Login).await?;
    let code = sender
        .codes()
        .last()
        .cloned()
        .context("no code dispatched")?;
    Ok(otp.redeem(destination, &code, None, device_id).await?)
}

#[tokio::test]
async fn rate_limit_ceiling_is_enforced() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };
    let sender = CapturingSender::new();
    let (otp, _sessions) = engine(&pool, sender.clone());
    let destination = unique_destination();

    let ceiling = TrustConfig::new().otp_rate_ceiling();
    for _ in 0..ceiling {
        otp.issue(&destination, Purpose::Login).await?;
    }
    let result = otp.issue(&destination, Purpose::Login).await;
    assert!(matches!(result, Err(AuthError::RateLimited)));
    assert_eq!(sender.codes().len() as i64, ceiling);
    Ok(())
}

#[tokio::test]
async fn code_redeems_exactly_once() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };
    let sender = CapturingSender::new();
    let (otp, _sessions) = engine(&pool, sender.clone());
    let destination = unique_destination();
    seed_profile(&pool, &destination, Role::Customer).await?;

    otp.issue(&destination, Purpose::Login).await?;
    let code = sender.codes().last().cloned().context("no code")?;
    let device = unique_device("dev");

    let issued = otp.redeem(&destination, &code, None, &device).await?;
    assert_eq!(issued.device_id, device);

    let replay = otp.redeem(&destination, &code, None, &device).await;
    assert!(matches!(replay, Err(AuthError::OtpInvalid)));
    Ok(())
}

#[tokio::test]
async fn only_newest_code_is_redeemable() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };
    let sender = CapturingSender::new();
    let (otp, _sessions) = engine(&pool, sender.clone());
    let destination = unique_destination();
    seed_profile(&pool, &destination, Role::Customer).await?;
    let device = unique_device("dev");

    otp.issue(&destination, Purpose::Login).await?;
    otp.issue(&destination, Purpose::Login).await?;
    let codes = sender.codes();
    let (first, second) = (codes[0].clone(), codes[1].clone());

    // Re-requesting supersedes the earlier code even though it is unexpired.
    let stale = otp.redeem(&destination, &first, None, &device).await;
    assert!(matches!(stale, Err(AuthError::OtpInvalid)));

    let issued = otp.redeem(&destination, &second, None, &device).await?;
    assert_eq!(issued.role, Role::Customer);
    Ok(())
}

#[tokio::test]
async fn single_device_login_evicts_previous_device() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };
    let sender = CapturingSender::new();
    let (otp, sessions) = engine(&pool, sender.clone());
    let destination = unique_destination();
    let owner_id = seed_profile(&pool, &destination, Role::Technician).await?;
    let device_a = unique_device("dev-a");
    let device_b = unique_device("dev-b");

    let first = login(&otp, &sender, &destination, &device_a).await?;
    let second = login(&otp, &sender, &destination, &device_b).await?;
    assert_eq!(second.evicted_device.as_deref(), Some(device_a.as_str()));

    // The evicted device's session died with it.
    let old = sessions.validate(&first.session_token).await;
    assert!(matches!(old, Err(AuthError::SessionRevoked)));
    sessions.validate(&second.session_token).await?;

    let row = sqlx::query("SELECT COUNT(*) AS active FROM devices WHERE owner_id = $1 AND is_active")
        .bind(owner_id)
        .fetch_one(&pool)
        .await?;
    let active: i64 = row.get("active");
    assert_eq!(active, 1);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };
    let sender = CapturingSender::new();
    let (otp, sessions) = engine(&pool, sender.clone());
    let destination = unique_destination();
    seed_profile(&pool, &destination, Role::Customer).await?;

    let first = login(&otp, &sender, &destination, &unique_device("dev")).await?;
    let second = sessions.refresh(&first.refresh_token).await?;
    assert_eq!(second.owner_id, first.owner_id);

    // The rotated-out token claims zero rows on replay.
    let replay = sessions.refresh(&first.refresh_token).await;
    assert!(matches!(replay, Err(AuthError::InvalidRefreshToken)));

    let old = sessions.validate(&first.session_token).await;
    assert!(matches!(old, Err(AuthError::SessionRevoked)));
    sessions.validate(&second.session_token).await?;
    Ok(())
}

#[tokio::test]
async fn revoke_is_idempotent() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };
    let sender = CapturingSender::new();
    let (otp, sessions) = engine(&pool, sender.clone());
    let destination = unique_destination();
    seed_profile(&pool, &destination, Role::Staff).await?;

    let issued = login(&otp, &sender, &destination, &unique_device("dev")).await?;
    sessions.revoke(&issued.session_token).await?;
    let state = sessions.validate(&issued.session_token).await;
    assert!(matches!(state, Err(AuthError::SessionRevoked)));

    // Second revoke is a no-op success.
    sessions.revoke(&issued.session_token).await?;
    Ok(())
}

#[tokio::test]
async fn tampered_entry_is_reported_and_recorded() -> Result<()> {
    let Some(pool) = pool().await? else {
        eprintln!("Skipping integration test: VIGIL_TEST_DSN not set");
        return Ok(());
    };

    let event = NewAuditEvent::anonymous(
        EventType::OtpRejected,
        "credential",
        &Uuid::new_v4().to_string(),
        Severity::Warning,
        serde_json::json!({ "reason": "invalid_code" }),
    );
    let (entry_id, _hash) = audit_repo::append_standalone(&pool, &event).await?;

    sqlx::query(r#"UPDATE audit_entries SET metadata = '{"reason":"altered"}' WHERE entry_id = $1"#)
        .bind(entry_id)
        .execute(&pool)
        .await?;

    let status = audit_repo::verify_range(&pool, entry_id, entry_id).await?;
    assert_eq!(status, ChainStatus::BrokenAt(entry_id));

    let response = verify(
        Extension(pool.clone()),
        Query(VerifyParams {
            start: Some(entry_id),
            end: Some(entry_id),
        }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let verdict: VerifyResponse = serde_json::from_slice(&bytes)?;
    assert_eq!(verdict.status, "broken");
    assert_eq!(verdict.broken_at, Some(entry_id));

    // The break itself went on the record as a critical entry.
    let row = sqlx::query(
        "SELECT COUNT(*) AS hits FROM audit_entries
         WHERE event_type = 'chain_broken' AND severity = 'critical' AND entity_id = $1",
    )
    .bind(entry_id.to_string())
    .fetch_one(&pool)
    .await?;
    let hits: i64 = row.get("hits");
    assert!(hits >= 1);
    Ok(())
}
