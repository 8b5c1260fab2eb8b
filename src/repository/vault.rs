//! Per-source credential vault.
//!
//! Secrets never traverse the read paths used to list or describe sources:
//! the raw blob is only reachable through `fetch`, which is crate-private.
//! The public surface exposes presence and a short fingerprint, nothing else.
//!
//! Writes are full-replace upserts. Disconnect clears the blob but keeps the
//! row, so a source's lifecycle stays independent of credential presence.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use crate::schema::source_secrets;

/// Restricted-access store for source credentials.
#[derive(Clone)]
pub struct SecretVault {
    pool: AsyncSqlitePool,
}

impl SecretVault {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Read the raw credential blob. Trusted code paths only; never exposed
    /// through the HTTP surface.
    pub(crate) async fn fetch(&self, source_id: &str) -> Result<Option<String>, DieselError> {
        let mut conn = self.pool.get().await?;

        let secret: Option<String> = source_secrets::table
            .find(source_id)
            .select(source_secrets::secret)
            .first(&mut conn)
            .await
            .optional()?;

        Ok(secret.filter(|s| !s.is_empty()))
    }

    /// Store (or fully replace) the credential for a source.
    pub async fn store(&self, source_id: &str, secret: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let updated_at = Utc::now().to_rfc3339();

        diesel::replace_into(source_secrets::table)
            .values((
                source_secrets::source_id.eq(source_id),
                source_secrets::secret.eq(secret),
                source_secrets::updated_at.eq(&updated_at),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Clear the credential, keeping the row. Used by disconnect and by
    /// auth-class provider failures.
    pub async fn clear(&self, source_id: &str) -> Result<(), DieselError> {
        self.store(source_id, "").await
    }

    /// Whether the source currently holds a non-empty credential.
    pub async fn is_connected(&self, source_id: &str) -> Result<bool, DieselError> {
        Ok(self.fetch(source_id).await?.is_some())
    }

    /// Non-secret fingerprint of the stored credential: first four characters
    /// plus its length. Returns None when disconnected.
    pub async fn fingerprint(&self, source_id: &str) -> Result<Option<String>, DieselError> {
        let secret = self.fetch(source_id).await?;
        Ok(secret.map(|s| {
            let head: String = s.chars().take(4).collect();
            format!("{}… ({} chars)", head, s.chars().count())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use tempfile::tempdir;

    async fn setup_vault() -> (SecretVault, tempfile::TempDir) {
        use diesel_async::SimpleAsyncConnection;
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        migrations::init_schema(&pool).await.unwrap();
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(
            "INSERT INTO sources (id, tenant_id, name, provider, created_at) \
             VALUES ('src-1', 't-1', 'test', 'ftps', '2020-01-01T00:00:00Z');",
        )
        .await
        .unwrap();
        (SecretVault::new(pool), dir)
    }

    #[tokio::test]
    async fn test_store_fetch_clear() {
        let (vault, _dir) = setup_vault().await;

        assert!(!vault.is_connected("src-1").await.unwrap());
        assert!(vault.fetch("src-1").await.unwrap().is_none());

        vault.store("src-1", "refresh-token-abc").await.unwrap();
        assert!(vault.is_connected("src-1").await.unwrap());
        assert_eq!(
            vault.fetch("src-1").await.unwrap().as_deref(),
            Some("refresh-token-abc")
        );

        // Full replace, not a merge
        vault.store("src-1", "rotated").await.unwrap();
        assert_eq!(vault.fetch("src-1").await.unwrap().as_deref(), Some("rotated"));

        // Clear keeps the row but reports disconnected
        vault.clear("src-1").await.unwrap();
        assert!(!vault.is_connected("src-1").await.unwrap());
        assert!(vault.fetch("src-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fingerprint_hides_secret() {
        let (vault, _dir) = setup_vault().await;

        vault.store("src-1", "1//0gabcdef-rest").await.unwrap();
        let fp = vault.fingerprint("src-1").await.unwrap().unwrap();
        assert!(fp.starts_with("1//0"));
        assert!(!fp.contains("abcdef-rest"));
    }
}
