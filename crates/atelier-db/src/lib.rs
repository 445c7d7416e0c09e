//! Postgres persistence.
//!
//! Pool plumbing (`connect_from_env`, `migrate`, `status`) returns
//! `anyhow::Result` for the binaries; [`PgStore`] implements the
//! `Repository` boundary and returns `StoreError`.

mod pg;
mod rows;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub use pg::PgStore;

pub const ENV_DB_URL: &str = "ATELIER_DATABASE_URL";

/// Connect to Postgres using ATELIER_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    /// The `orders` table exists, i.e. migrations have run.
    pub has_schema: bool,
    pub applied_migrations: i64,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (has_schema,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    let (has_ledger,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = '_sqlx_migrations'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status migrations-table query failed")?;

    let applied_migrations = if has_ledger {
        let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
            "select count(*)::bigint from _sqlx_migrations where success",
        )
        .fetch_one(pool)
        .await
        .context("status migrations count failed")?;
        n
    } else {
        0
    };

    Ok(DbStatus {
        ok: one == 1,
        has_schema,
        applied_migrations,
    })
}

/// Pool for DB-backed tests, or `None` when ATELIER_DATABASE_URL is unset.
pub async fn testkit_db_pool() -> Result<Option<PgPool>> {
    let url = match std::env::var(ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .context("testkit pool connect failed")?;
    migrate(&pool).await?;
    Ok(Some(pool))
}
