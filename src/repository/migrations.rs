//! Schema initialization for SQLite.
//!
//! Creates the tables if they don't exist. Statements are idempotent so this
//! is safe to run on every startup.

use diesel_async::SimpleAsyncConnection;

use super::pool::{AsyncSqlitePool, DieselError};

/// Initialize all database schemas.
pub async fn init_schema(pool: &AsyncSqlitePool) -> Result<(), DieselError> {
    let mut conn = pool.get().await?;

    conn.batch_execute(
        r#"
        -- Configured document feeds, one per (tenant, feed)
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            provider TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            schedule_minutes INTEGER NOT NULL DEFAULT 5,
            config TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            last_run_at TEXT,
            last_attempt_at TEXT,
            last_error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sources_tenant ON sources(tenant_id);

        -- Per-source credential blob; cleared (not deleted) on disconnect
        CREATE TABLE IF NOT EXISTS source_secrets (
            source_id TEXT PRIMARY KEY,
            secret TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL,
            FOREIGN KEY (source_id) REFERENCES sources(id)
        );

        -- Dedup ledger: the uniqueness constraint is the at-most-once guard
        CREATE TABLE IF NOT EXISTS source_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            remote_modified TEXT,
            remote_size INTEGER,
            document_id TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            UNIQUE(source_id, remote_id),
            FOREIGN KEY (source_id) REFERENCES sources(id)
        );

        -- Tenant cron credentials (hash only, never the raw secret)
        CREATE TABLE IF NOT EXISTS cron_secrets (
            tenant_id TEXT PRIMARY KEY,
            key_prefix TEXT NOT NULL,
            secret_hash TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            default_run_limit INTEGER NOT NULL DEFAULT 10,
            last_used_at TEXT,
            updated_at TEXT NOT NULL
        );

        -- Best-effort per-source lease for scheduled runs
        CREATE TABLE IF NOT EXISTS sync_leases (
            source_id TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY (source_id) REFERENCES sources(id)
        );
        "#,
    )
    .await?;

    Ok(())
}
