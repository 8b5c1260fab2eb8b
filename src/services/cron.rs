//! Cron authenticator for unattended sync calls.
//!
//! Raw secrets are handed out exactly once at rotation and only their
//! peppered blake3 hash is stored. Verification re-derives the hash and
//! compares blake3::Hash values, whose equality is constant-time. A
//! deployment-wide shared key is an alternate, coarser credential.

use chrono::Utc;
use rand::RngCore;

use crate::models::CronSecret;
use crate::repository::{CronSecretRepository, DieselError};

/// Printable prefix on every issued key; makes keys greppable in configs and
/// recognizable in support tickets without revealing anything.
const KEY_TAG: &str = "lfk_";
/// Raw entropy per key.
const SECRET_BYTES: usize = 20;
/// Visible prefix length stored for identification (tag + 8 hex chars).
const PREFIX_LEN: usize = 12;

const DEFAULT_RUN_LIMIT: i32 = 10;

/// Status response for the automation entry point.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CronStatus {
    pub configured: bool,
    pub enabled: bool,
    pub key_prefix: String,
    pub default_run_limit: i32,
}

/// Issues and verifies tenant cron secrets.
pub struct CronAuthenticator {
    repo: CronSecretRepository,
    pepper_key: [u8; 32],
    global_key: Option<String>,
}

impl CronAuthenticator {
    pub fn new(repo: CronSecretRepository, pepper: &str, global_key: Option<String>) -> Self {
        Self {
            repo,
            pepper_key: blake3::derive_key("ledgerfeed cron secret v1", pepper.as_bytes()),
            global_key: global_key.filter(|k| !k.is_empty()),
        }
    }

    fn hash(&self, raw: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.pepper_key, raw.as_bytes())
    }

    /// Generate and store a new secret for the tenant, replacing any previous
    /// one atomically. Returns the raw secret; it is never retrievable again.
    pub async fn rotate(&self, tenant_id: &str) -> Result<String, DieselError> {
        let mut entropy = [0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut entropy);
        let raw = format!("{}{}", KEY_TAG, hex::encode(entropy));

        let existing = self.repo.get(tenant_id).await?;
        let record = CronSecret {
            tenant_id: tenant_id.to_string(),
            key_prefix: raw.chars().take(PREFIX_LEN).collect(),
            secret_hash: self.hash(&raw).to_hex().to_string(),
            enabled: existing.as_ref().map(|s| s.enabled).unwrap_or(true),
            default_run_limit: existing
                .map(|s| s.default_run_limit)
                .unwrap_or(DEFAULT_RUN_LIMIT),
            last_used_at: None,
        };
        self.repo.replace(&record).await?;

        Ok(raw)
    }

    /// Verify a supplied secret for the tenant. Accepts only when a record
    /// exists, is enabled, and the peppered hash matches; the comparison is
    /// constant-time. Stamps last-used on success.
    pub async fn authenticate(
        &self,
        tenant_id: &str,
        supplied: &str,
    ) -> Result<bool, DieselError> {
        let Some(record) = self.repo.get(tenant_id).await? else {
            return Ok(false);
        };
        if !record.enabled {
            return Ok(false);
        }

        let mut stored = [0u8; 32];
        if hex::decode_to_slice(&record.secret_hash, &mut stored).is_err() {
            return Ok(false);
        }

        if self.hash(supplied) != blake3::Hash::from(stored) {
            return Ok(false);
        }

        self.repo.touch_last_used(tenant_id, Utc::now()).await?;
        Ok(true)
    }

    /// Verify the deployment-wide shared key, when one is configured. Both
    /// sides are hashed before comparison so the check stays constant-time.
    pub fn check_global(&self, supplied: &str) -> bool {
        match &self.global_key {
            Some(key) => self.hash(supplied) == self.hash(key),
            None => false,
        }
    }

    /// Status for the automation entry point. Never includes hash material.
    pub async fn status(&self, tenant_id: &str) -> Result<CronStatus, DieselError> {
        Ok(match self.repo.get(tenant_id).await? {
            Some(record) => CronStatus {
                configured: true,
                enabled: record.enabled,
                key_prefix: record.key_prefix,
                default_run_limit: record.default_run_limit,
            },
            None => CronStatus {
                configured: false,
                enabled: false,
                key_prefix: String::new(),
                default_run_limit: DEFAULT_RUN_LIMIT,
            },
        })
    }

    /// Run limit for a tenant's unattended calls.
    pub async fn run_limit(&self, tenant_id: &str) -> Result<i32, DieselError> {
        Ok(self
            .repo
            .get(tenant_id)
            .await?
            .map(|r| r.default_run_limit)
            .unwrap_or(DEFAULT_RUN_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{migrations, AsyncSqlitePool};
    use tempfile::tempdir;

    async fn setup(global: Option<&str>) -> (CronAuthenticator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        migrations::init_schema(&pool).await.unwrap();
        let auth = CronAuthenticator::new(
            CronSecretRepository::new(pool),
            "test pepper",
            global.map(|s| s.to_string()),
        );
        (auth, dir)
    }

    #[tokio::test]
    async fn test_rotate_and_authenticate() {
        let (auth, _dir) = setup(None).await;

        let raw = auth.rotate("tenant-1").await.unwrap();
        assert!(raw.starts_with(KEY_TAG));
        assert!(auth.authenticate("tenant-1", &raw).await.unwrap());
        assert!(!auth.authenticate("tenant-1", "lfk_wrong").await.unwrap());
        assert!(!auth.authenticate("tenant-2", &raw).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_invalidates_previous_secret() {
        let (auth, _dir) = setup(None).await;

        let first = auth.rotate("tenant-1").await.unwrap();
        assert!(auth.authenticate("tenant-1", &first).await.unwrap());

        let second = auth.rotate("tenant-1").await.unwrap();
        assert_ne!(first, second);
        assert!(!auth.authenticate("tenant-1", &first).await.unwrap());
        assert!(auth.authenticate("tenant-1", &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_record_rejects() {
        let (auth, _dir) = setup(None).await;

        let raw = auth.rotate("tenant-1").await.unwrap();
        auth.repo.set_enabled("tenant-1", false).await.unwrap();
        assert!(!auth.authenticate("tenant-1", &raw).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_reports_prefix_not_secret() {
        let (auth, _dir) = setup(None).await;

        let status = auth.status("tenant-1").await.unwrap();
        assert!(!status.configured);

        let raw = auth.rotate("tenant-1").await.unwrap();
        let status = auth.status("tenant-1").await.unwrap();
        assert!(status.configured);
        assert!(status.enabled);
        assert_eq!(status.key_prefix, raw[..PREFIX_LEN].to_string());
        assert_eq!(status.key_prefix.len(), PREFIX_LEN);
        assert!(raw.len() > PREFIX_LEN);
    }

    #[tokio::test]
    async fn test_global_key() {
        let (auth, _dir) = setup(Some("deploy-wide-key")).await;
        assert!(auth.check_global("deploy-wide-key"));
        assert!(!auth.check_global("something-else"));

        let (auth, _dir) = setup(None).await;
        assert!(!auth.check_global("deploy-wide-key"));
    }

    #[tokio::test]
    async fn test_last_used_stamped_on_success() {
        let (auth, _dir) = setup(None).await;

        let raw = auth.rotate("tenant-1").await.unwrap();
        assert!(auth.repo.get("tenant-1").await.unwrap().unwrap().last_used_at.is_none());

        auth.authenticate("tenant-1", &raw).await.unwrap();
        assert!(auth.repo.get("tenant-1").await.unwrap().unwrap().last_used_at.is_some());
    }
}
