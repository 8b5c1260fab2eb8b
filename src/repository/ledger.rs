//! Dedup ledger repository.
//!
//! The `(source_id, remote_id)` uniqueness constraint is the sole mechanism
//! preventing duplicate import under retries, overlapping runs, or duplicate
//! entries within one request. Inserts use ON CONFLICT DO NOTHING so a racing
//! loser sees "zero rows" rather than an error.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::NewSourceItem;
use crate::models::SourceItem;
use crate::schema::source_items;

/// Ledger of already-imported remote items.
#[derive(Clone)]
pub struct SourceItemRepository {
    pool: AsyncSqlitePool,
}

impl SourceItemRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Check whether a remote item has already been imported.
    pub async fn contains(&self, source_id: &str, remote_id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = source_items::table
            .filter(source_items::source_id.eq(source_id))
            .filter(source_items::remote_id.eq(remote_id))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    /// Record an imported item. Returns false when another run (or an earlier
    /// entry in the same batch) already recorded the pair; the caller must
    /// treat that as SKIPPED, not as an error.
    pub async fn record(&self, item: &SourceItem) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        let remote_modified = item.remote_modified.map(|dt| dt.to_rfc3339());
        let imported_at = item.imported_at.to_rfc3339();
        let new = NewSourceItem {
            source_id: &item.source_id,
            remote_id: &item.remote_id,
            remote_modified: remote_modified.as_deref(),
            remote_size: item.remote_size,
            document_id: &item.document_id,
            imported_at: &imported_at,
        };

        let rows = diesel::insert_into(source_items::table)
            .values(&new)
            .on_conflict((source_items::source_id, source_items::remote_id))
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    /// Count ledger entries for a source.
    pub async fn count_for_source(&self, source_id: &str) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        source_items::table
            .filter(source_items::source_id.eq(source_id))
            .select(count_star())
            .first(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use chrono::Utc;
    use tempfile::tempdir;

    async fn setup_ledger() -> (SourceItemRepository, tempfile::TempDir) {
        use diesel_async::SimpleAsyncConnection;
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        migrations::init_schema(&pool).await.unwrap();
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(
            "INSERT INTO sources (id, tenant_id, name, provider, created_at) \
             VALUES ('src-1', 't-1', 'test', 'ftps', '2020-01-01T00:00:00Z'), \
                    ('src-2', 't-1', 'test', 'ftps', '2020-01-01T00:00:00Z');",
        )
        .await
        .unwrap();
        (SourceItemRepository::new(pool), dir)
    }

    fn item(remote_id: &str, document_id: &str) -> SourceItem {
        SourceItem::new(
            "src-1".into(),
            remote_id.into(),
            Some(Utc::now()),
            Some(2048),
            document_id.into(),
        )
    }

    #[tokio::test]
    async fn test_record_is_at_most_once() {
        let (ledger, _dir) = setup_ledger().await;

        assert!(!ledger.contains("src-1", "remote-a").await.unwrap());
        assert!(ledger.record(&item("remote-a", "doc-1")).await.unwrap());
        assert!(ledger.contains("src-1", "remote-a").await.unwrap());

        // Second insert for the same pair loses quietly
        assert!(!ledger.record(&item("remote-a", "doc-2")).await.unwrap());
        assert_eq!(ledger.count_for_source("src-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pairs_are_scoped_per_source() {
        let (ledger, _dir) = setup_ledger().await;

        let mut other = item("remote-a", "doc-1");
        other.source_id = "src-2".into();

        assert!(ledger.record(&item("remote-a", "doc-1")).await.unwrap());
        assert!(ledger.record(&other).await.unwrap());
        assert_eq!(ledger.count_for_source("src-1").await.unwrap(), 1);
        assert_eq!(ledger.count_for_source("src-2").await.unwrap(), 1);
    }
}
