//! Best-effort per-source leases for scheduled runs.
//!
//! Two scheduled runs of the same source may otherwise hit the provider
//! simultaneously; the dedup ledger already prevents double-import, so the
//! lease only exists to avoid double-fetch cost. Acquisition is an insert
//! with conflict detection after sweeping expired rows; there is no fencing,
//! and holders that crash simply let the TTL lapse.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use crate::schema::sync_leases;

/// Lease store keyed by source id.
#[derive(Clone)]
pub struct LeaseRepository {
    pool: AsyncSqlitePool,
}

impl LeaseRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Try to take the lease for `ttl`. Returns false when a live lease is
    /// held by someone else.
    pub async fn try_acquire(
        &self,
        source_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let expires_at = (now + ttl).to_rfc3339();

        // Sweep expired leases for this source first, then race on the insert.
        diesel::delete(
            sync_leases::table
                .filter(sync_leases::source_id.eq(source_id))
                .filter(sync_leases::expires_at.lt(now.to_rfc3339())),
        )
        .execute(&mut conn)
        .await?;

        let rows = diesel::insert_into(sync_leases::table)
            .values((
                sync_leases::source_id.eq(source_id),
                sync_leases::holder.eq(holder),
                sync_leases::expires_at.eq(&expires_at),
            ))
            .on_conflict(sync_leases::source_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    /// Release a held lease. Only the holder's own lease is removed.
    pub async fn release(&self, source_id: &str, holder: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::delete(
            sync_leases::table
                .filter(sync_leases::source_id.eq(source_id))
                .filter(sync_leases::holder.eq(holder)),
        )
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    /// Current lease expiry for a source, if any.
    pub async fn current_expiry(
        &self,
        source_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DieselError> {
        let mut conn = self.pool.get().await?;

        let expires: Option<String> = sync_leases::table
            .find(source_id)
            .select(sync_leases::expires_at)
            .first(&mut conn)
            .await
            .optional()?;

        Ok(super::parse_datetime_opt(expires))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use tempfile::tempdir;

    async fn setup_leases() -> (LeaseRepository, tempfile::TempDir) {
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
        (LeaseRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn test_second_holder_is_refused() {
        let (leases, _dir) = setup_leases().await;
        let ttl = Duration::minutes(10);

        assert!(leases.try_acquire("src-1", "run-a", ttl).await.unwrap());
        assert!(!leases.try_acquire("src-1", "run-b", ttl).await.unwrap());

        leases.release("src-1", "run-a").await.unwrap();
        assert!(leases.try_acquire("src-1", "run-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_is_swept() {
        let (leases, _dir) = setup_leases().await;

        assert!(leases
            .try_acquire("src-1", "run-a", Duration::minutes(-1))
            .await
            .unwrap());
        // The previous lease is already past its TTL, so a new holder wins.
        assert!(leases
            .try_acquire("src-1", "run-b", Duration::minutes(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_release_is_holder_scoped() {
        let (leases, _dir) = setup_leases().await;
        let ttl = Duration::minutes(10);

        assert!(leases.try_acquire("src-1", "run-a", ttl).await.unwrap());
        leases.release("src-1", "run-b").await.unwrap();
        // run-b's release must not drop run-a's lease
        assert!(!leases.try_acquire("src-1", "run-c", ttl).await.unwrap());
    }
}
