//! Credential lifecycle tests against a live PostgreSQL instance
//!
//! These need DATABASE_URL pointing at a reachable database and are
//! ignored by default; run with `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use auth::models::NewUser;
use auth::repositories::{UserRepository, is_unique_violation};
use auth::{codes, password};
use common::database::{self, DatabaseConfig};

async fn setup() -> anyhow::Result<(PgPool, UserRepository)> {
    let config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let repository = UserRepository::new(pool.clone());
    Ok((pool, repository))
}

fn unique_email() -> String {
    format!("trader+{}@example.com", Uuid::new_v4().simple())
}

fn new_user(email: &str, password_hash: String, code: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        password_hash,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        verification_code: code.to_string(),
        verification_code_expires_at: Utc::now() + Duration::minutes(10),
    }
}

async fn cleanup(pool: &PgPool, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_verification_code_is_single_use() -> anyhow::Result<()> {
    let (pool, repository) = setup().await?;

    let email = unique_email();
    let code = codes::generate();
    let user = repository
        .create(
            &new_user(&email, password::hash("Str0ng pass1")?, &code),
            &["cash".to_string()],
        )
        .await?;

    // Wrong code leaves the account unverified.
    assert!(!repository.verify_email(&email, "000000").await?);
    let stored = repository.find_by_email(&email).await?.unwrap();
    assert!(!stored.verified);

    // The mailed code verifies once and activates the accounts.
    assert!(repository.verify_email(&email, &code).await?);
    let stored = repository.find_by_email(&email).await?.unwrap();
    assert!(stored.verified);
    assert!(stored.verification_code.is_none());
    assert!(stored.verification_code_expires_at.is_none());

    let accounts = repository.find_accounts_for_user(user.id).await?;
    assert_eq!(accounts.len(), 1);
    assert!(accounts.iter().all(|a| a.status == "active"));

    // The same code is spent; a second attempt fails.
    assert!(!repository.verify_email(&email, &code).await?);

    cleanup(&pool, user.id).await
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_duplicate_email_trips_unique_index() -> anyhow::Result<()> {
    let (pool, repository) = setup().await?;

    let email = unique_email();
    let user = repository
        .create(
            &new_user(&email, password::hash("Str0ng pass1")?, &codes::generate()),
            &["cash".to_string()],
        )
        .await?;

    let err = repository
        .create(
            &new_user(&email, password::hash("0ther pass2")?, &codes::generate()),
            &["cash".to_string()],
        )
        .await
        .unwrap_err();
    assert!(is_unique_violation(&err));

    // The index is on lower(email), so a case variant collides too.
    let err = repository
        .create(
            &new_user(
                &email.to_uppercase(),
                password::hash("0ther pass2")?,
                &codes::generate(),
            ),
            &["cash".to_string()],
        )
        .await
        .unwrap_err();
    assert!(is_unique_violation(&err));

    cleanup(&pool, user.id).await
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_password_reset_end_to_end() -> anyhow::Result<()> {
    let (pool, repository) = setup().await?;

    let email = unique_email();
    let user = repository
        .create(
            &new_user(&email, password::hash("0ld password1")?, &codes::generate()),
            &["cash".to_string()],
        )
        .await?;

    let reset_code = codes::generate();
    repository
        .set_reset_code(user.id, &reset_code, Utc::now() + Duration::minutes(10))
        .await?;

    let updated = repository
        .update_password_and_clear_reset(&email, &reset_code, &password::hash("N3w password2")?)
        .await?;
    assert!(updated);

    let stored = repository.find_by_email(&email).await?.unwrap();
    assert!(!password::verify("0ld password1", &stored.password_hash));
    assert!(password::verify("N3w password2", &stored.password_hash));
    assert!(stored.reset_code.is_none());
    assert!(stored.reset_code_expires_at.is_none());

    // The code was consumed by the update; replaying it changes nothing.
    let replayed = repository
        .update_password_and_clear_reset(&email, &reset_code, &password::hash("Thr3e password")?)
        .await?;
    assert!(!replayed);
    let stored = repository.find_by_email(&email).await?.unwrap();
    assert!(password::verify("N3w password2", &stored.password_hash));

    cleanup(&pool, user.id).await
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_expired_reset_code_cannot_update_password() -> anyhow::Result<()> {
    let (pool, repository) = setup().await?;

    let email = unique_email();
    let user = repository
        .create(
            &new_user(&email, password::hash("0ld password1")?, &codes::generate()),
            &["cash".to_string()],
        )
        .await?;

    let reset_code = codes::generate();
    repository
        .set_reset_code(user.id, &reset_code, Utc::now() - Duration::minutes(1))
        .await?;

    let updated = repository
        .update_password_and_clear_reset(&email, &reset_code, &password::hash("N3w password2")?)
        .await?;
    assert!(!updated);

    let stored = repository.find_by_email(&email).await?.unwrap();
    assert!(password::verify("0ld password1", &stored.password_hash));

    cleanup(&pool, user.id).await
}
