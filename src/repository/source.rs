//! Source repository.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! while maintaining Diesel's compile-time query checking.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::SourceRecord;
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{Source, SourceProvider, MIN_SCHEDULE_MINUTES};
use crate::schema::sources;

/// Convert a database record to a domain model.
impl From<SourceRecord> for Source {
    fn from(record: SourceRecord) -> Self {
        Source {
            id: record.id,
            tenant_id: record.tenant_id,
            name: record.name,
            provider: SourceProvider::from_str(&record.provider).unwrap_or(SourceProvider::Sftp),
            enabled: record.enabled != 0,
            schedule_minutes: record.schedule_minutes,
            config: serde_json::from_str(&record.config).unwrap_or_default(),
            created_at: parse_datetime(&record.created_at),
            last_run_at: parse_datetime_opt(record.last_run_at),
            last_attempt_at: parse_datetime_opt(record.last_attempt_at),
            last_error: record.last_error,
        }
    }
}

/// Source repository with compile-time query checking.
#[derive(Clone)]
pub struct SourceRepository {
    pool: AsyncSqlitePool,
}

impl SourceRepository {
    /// Create a new source repository with an existing pool.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Get a source by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Source>, DieselError> {
        let mut conn = self.pool.get().await?;

        sources::table
            .find(id)
            .first::<SourceRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Source::from))
    }

    /// Get all sources for a tenant.
    pub async fn get_for_tenant(&self, tenant_id: &str) -> Result<Vec<Source>, DieselError> {
        let mut conn = self.pool.get().await?;

        sources::table
            .filter(sources::tenant_id.eq(tenant_id))
            .order(sources::created_at.asc())
            .load::<SourceRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(Source::from).collect())
    }

    /// Save a source (insert or update using REPLACE).
    ///
    /// Clamps `schedule_minutes` to the configured floor; callers cannot
    /// schedule tighter than that regardless of the request.
    pub async fn save(&self, source: &Source) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        let config_json =
            serde_json::to_string(&source.config).unwrap_or_else(|_| "{}".to_string());
        let created_at = source.created_at.to_rfc3339();
        let last_run_at = source.last_run_at.map(|dt| dt.to_rfc3339());
        let last_attempt_at = source.last_attempt_at.map(|dt| dt.to_rfc3339());
        let schedule = source.schedule_minutes.max(MIN_SCHEDULE_MINUTES);

        diesel::replace_into(sources::table)
            .values((
                sources::id.eq(&source.id),
                sources::tenant_id.eq(&source.tenant_id),
                sources::name.eq(&source.name),
                sources::provider.eq(source.provider.as_str()),
                sources::enabled.eq(i32::from(source.enabled)),
                sources::schedule_minutes.eq(schedule),
                sources::config.eq(&config_json),
                sources::created_at.eq(&created_at),
                sources::last_run_at.eq(&last_run_at),
                sources::last_attempt_at.eq(&last_attempt_at),
                sources::last_error.eq(&source.last_error),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Toggle the enabled flag.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(sources::table.find(id))
            .set(sources::enabled.eq(i32::from(enabled)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Record the start of a run.
    pub async fn mark_attempt(&self, id: &str, at: DateTime<Utc>) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = at.to_rfc3339();

        diesel::update(sources::table.find(id))
            .set(sources::last_attempt_at.eq(Some(&ts)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Record a completed run and its outcome. `error` is cleared on success.
    pub async fn mark_run(
        &self,
        id: &str,
        at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = at.to_rfc3339();

        match error {
            None => {
                diesel::update(sources::table.find(id))
                    .set((
                        sources::last_run_at.eq(Some(&ts)),
                        sources::last_error.eq(None::<&str>),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            Some(msg) => {
                diesel::update(sources::table.find(id))
                    .set(sources::last_error.eq(Some(msg)))
                    .execute(&mut conn)
                    .await?;
            }
        }

        Ok(())
    }

    /// Check if a source exists.
    pub async fn exists(&self, id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = sources::table
            .filter(sources::id.eq(id))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceConfig;
    use crate::repository::migrations;
    use tempfile::tempdir;

    async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = AsyncSqlitePool::from_path(&db_path);
        migrations::init_schema(&pool).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_source_crud() {
        let (pool, _dir) = setup_test_db().await;
        let repo = SourceRepository::new(pool);

        let source = Source::new(
            "src-1".to_string(),
            "tenant-1".to_string(),
            "Bank statements".to_string(),
            SourceProvider::Sftp,
            SourceConfig {
                host: Some("sftp.example.com".into()),
                username: Some("acct".into()),
                root_path: Some("/outbox".into()),
                ..SourceConfig::default()
            },
        );

        repo.save(&source).await.unwrap();
        assert!(repo.exists("src-1").await.unwrap());

        let fetched = repo.get("src-1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "Bank statements");
        assert_eq!(fetched.tenant_id, "tenant-1");
        assert_eq!(fetched.provider, SourceProvider::Sftp);
        assert_eq!(fetched.config.host.as_deref(), Some("sftp.example.com"));

        let all = repo.get_for_tenant("tenant-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(repo.get_for_tenant("tenant-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_floor_applied_on_save() {
        let (pool, _dir) = setup_test_db().await;
        let repo = SourceRepository::new(pool);

        let mut source = Source::new(
            "src-1".to_string(),
            "tenant-1".to_string(),
            "Receipts".to_string(),
            SourceProvider::GoogleDrive,
            SourceConfig::default(),
        );
        source.schedule_minutes = 1;
        repo.save(&source).await.unwrap();
        assert_eq!(
            repo.get("src-1").await.unwrap().unwrap().schedule_minutes,
            5
        );

        source.schedule_minutes = 30;
        repo.save(&source).await.unwrap();
        assert_eq!(
            repo.get("src-1").await.unwrap().unwrap().schedule_minutes,
            30
        );
    }

    #[tokio::test]
    async fn test_run_bookkeeping() {
        let (pool, _dir) = setup_test_db().await;
        let repo = SourceRepository::new(pool);

        let source = Source::new(
            "src-1".to_string(),
            "tenant-1".to_string(),
            "Invoices".to_string(),
            SourceProvider::Ftps,
            SourceConfig::default(),
        );
        repo.save(&source).await.unwrap();

        let now = Utc::now();
        repo.mark_attempt("src-1", now).await.unwrap();
        repo.mark_run("src-1", now, Some("connection refused"))
            .await
            .unwrap();

        let fetched = repo.get("src-1").await.unwrap().unwrap();
        assert!(fetched.last_attempt_at.is_some());
        assert!(fetched.last_run_at.is_none());
        assert_eq!(fetched.last_error.as_deref(), Some("connection refused"));

        repo.mark_run("src-1", now, None).await.unwrap();
        let fetched = repo.get("src-1").await.unwrap().unwrap();
        assert!(fetched.last_run_at.is_some());
        assert!(fetched.last_error.is_none());
    }
}
