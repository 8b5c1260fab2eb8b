//! Cron secret repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{AsyncSqlitePool, DieselError};
use super::records::CronSecretRecord;
use super::parse_datetime_opt;
use crate::models::CronSecret;
use crate::schema::cron_secrets;

impl From<CronSecretRecord> for CronSecret {
    fn from(record: CronSecretRecord) -> Self {
        CronSecret {
            tenant_id: record.tenant_id,
            key_prefix: record.key_prefix,
            secret_hash: record.secret_hash,
            enabled: record.enabled != 0,
            default_run_limit: record.default_run_limit,
            last_used_at: parse_datetime_opt(record.last_used_at),
        }
    }
}

/// Storage for per-tenant cron credentials.
#[derive(Clone)]
pub struct CronSecretRepository {
    pool: AsyncSqlitePool,
}

impl CronSecretRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Get the tenant's cron secret record.
    pub async fn get(&self, tenant_id: &str) -> Result<Option<CronSecret>, DieselError> {
        let mut conn = self.pool.get().await?;

        cron_secrets::table
            .find(tenant_id)
            .first::<CronSecretRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(CronSecret::from))
    }

    /// Replace the tenant's record wholesale. Rotation goes through here so
    /// prefix and hash always change together and the previous secret dies
    /// immediately.
    pub async fn replace(&self, secret: &CronSecret) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let updated_at = Utc::now().to_rfc3339();
        let last_used_at = secret.last_used_at.map(|dt| dt.to_rfc3339());

        diesel::replace_into(cron_secrets::table)
            .values((
                cron_secrets::tenant_id.eq(&secret.tenant_id),
                cron_secrets::key_prefix.eq(&secret.key_prefix),
                cron_secrets::secret_hash.eq(&secret.secret_hash),
                cron_secrets::enabled.eq(i32::from(secret.enabled)),
                cron_secrets::default_run_limit.eq(secret.default_run_limit),
                cron_secrets::last_used_at.eq(&last_used_at),
                cron_secrets::updated_at.eq(&updated_at),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Toggle whether unattended calls are accepted at all.
    pub async fn set_enabled(&self, tenant_id: &str, enabled: bool) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(cron_secrets::table.find(tenant_id))
            .set(cron_secrets::enabled.eq(i32::from(enabled)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Stamp a successful unattended call.
    pub async fn touch_last_used(
        &self,
        tenant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = at.to_rfc3339();

        diesel::update(cron_secrets::table.find(tenant_id))
            .set(cron_secrets::last_used_at.eq(Some(&ts)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
