use atelier_schemas::{CodePurpose, VerificationCode};
use atelier_store::Repository;
use chrono::{Duration, Utc};
use uuid::Uuid;

/// `atelier codes purge` deletes codes that expired before the window.
///
/// This test is DB-backed and is skipped if ATELIER_DATABASE_URL is not set.
#[tokio::test]
async fn cli_codes_purge_removes_long_expired_codes() -> anyhow::Result<()> {
    let url = match std::env::var(atelier_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ATELIER_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = match atelier_db::testkit_db_pool().await {
        Ok(Some(p)) => p,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("SKIP: cannot reach DB: {e}");
            return Ok(());
        }
    };
    let store = atelier_db::PgStore::new(pool);

    let now = Utc::now();
    let stale_email = format!("{}@purge.test", Uuid::new_v4().simple());
    let fresh_email = format!("{}@purge.test", Uuid::new_v4().simple());
    let code = |email: &str, expires_in: Duration| VerificationCode {
        id: Uuid::new_v4(),
        subject: email.to_string(),
        purpose: CodePurpose::CustomerEmail,
        code: "123456".to_string(),
        expires_at_utc: now + expires_in,
        used: false,
        attempts: 0,
        created_at_utc: now - Duration::days(3),
    };
    store.insert_code(&code(&stale_email, -Duration::days(2))).await?;
    store.insert_code(&code(&fresh_email, Duration::minutes(10))).await?;

    let mut cmd = assert_cmd::Command::cargo_bin("atelier")?;
    cmd.env(atelier_db::ENV_DB_URL, &url)
        .args(["codes", "purge", "--older-than-minutes", "60"]);
    cmd.assert().success();

    assert!(store
        .latest_code(&stale_email, CodePurpose::CustomerEmail)
        .await?
        .is_none());
    assert!(store
        .latest_code(&fresh_email, CodePurpose::CustomerEmail)
        .await?
        .is_some());
    Ok(())
}
