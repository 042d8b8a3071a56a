//! Database connection management and schema setup

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create the cash-out tables and the HD index sequence if they do not
/// exist yet. Idempotent; safe to run at every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cash_out_txs (
            id                 TEXT PRIMARY KEY,
            device_id          TEXT NOT NULL,
            to_address         TEXT,
            hd_index           BIGINT,
            crypto_atoms       NUMERIC(30, 0) NOT NULL,
            fiat               NUMERIC(14, 5) NOT NULL,
            tx_hash            TEXT,
            status             TEXT NOT NULL,
            dispense           BOOLEAN NOT NULL DEFAULT false,
            dispense_confirmed BOOLEAN NOT NULL DEFAULT false,
            dispense_time      TIMESTAMPTZ,
            bills              JSONB,
            notified           BOOLEAN NOT NULL DEFAULT false,
            redeem             BOOLEAN NOT NULL DEFAULT false,
            swept              BOOLEAN NOT NULL DEFAULT false,
            phone              TEXT,
            error              TEXT,
            created            TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cash_out_actions (
            id      BIGSERIAL PRIMARY KEY,
            tx_id   TEXT NOT NULL,
            action  TEXT NOT NULL,
            redeem  BOOLEAN NOT NULL DEFAULT false,
            payload JSONB,
            created TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_cassettes (
            device_id    TEXT NOT NULL,
            slot         SMALLINT NOT NULL,
            denomination NUMERIC(10, 0) NOT NULL,
            count        INTEGER NOT NULL,
            PRIMARY KEY (device_id, slot)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE SEQUENCE IF NOT EXISTS hd_indexes_seq")
        .execute(pool)
        .await?;

    tracing::info!("cash-out schema ensured");
    Ok(())
}
