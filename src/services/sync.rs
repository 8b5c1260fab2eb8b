//! Sync and test engine.
//!
//! `test` lists a feed without importing; `import` downloads requested items,
//! hands each one to the import pipeline, and records it in the dedup
//! ledger. Items are isolated: a failure marks that item ERROR and the batch
//! continues. The ledger's uniqueness constraint is what keeps overlapping
//! runs and duplicate request entries at-most-once; the engine only has to
//! treat a losing insert as SKIPPED.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::connectors::{
    apply_glob_filter, Connector, ConnectorError, ConnectorFactory, TEST_LIST_LIMIT,
};
use crate::connectors::RemoteFile;
use crate::models::{Source, SourceItem};
use crate::repository::{
    DieselError, LeaseRepository, SecretVault, SourceItemRepository, SourceRepository,
};
use crate::services::pipeline::ImportPipeline;

/// TTL for the scheduled-run lease. Long enough for a slow provider sweep,
/// short enough that a crashed holder doesn't block the schedule for long.
const LEASE_TTL_MINUTES: i64 = 10;

/// Error types for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No credential in the vault; the source must be (re)connected first.
    #[error("source is not connected")]
    NotConnected,
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("database error: {0}")]
    Db(#[from] DieselError),
}

/// One requested item in an import call. Interactive requests carry only id
/// and name; scheduled runs also pass the listing metadata through so the
/// ledger rows are complete.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// Per-item outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Imported,
    Skipped,
    Error,
}

/// Per-item result line.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate outcome of an import call.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub results: Vec<ItemResult>,
}

/// Outcome of a scheduled run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(ImportReport),
    /// Another run holds the source's lease; nothing was done.
    AlreadyRunning,
}

/// The sync/test engine. Stateless between calls; all cross-request
/// correlation lives in the repositories.
pub struct SyncEngine {
    sources: SourceRepository,
    vault: SecretVault,
    ledger: SourceItemRepository,
    leases: LeaseRepository,
    factory: Arc<dyn ConnectorFactory>,
    pipeline: Arc<dyn ImportPipeline>,
}

impl SyncEngine {
    pub fn new(
        sources: SourceRepository,
        vault: SecretVault,
        ledger: SourceItemRepository,
        leases: LeaseRepository,
        factory: Arc<dyn ConnectorFactory>,
        pipeline: Arc<dyn ImportPipeline>,
    ) -> Self {
        Self {
            sources,
            vault,
            ledger,
            leases,
            factory,
            pipeline,
        }
    }

    /// Resolve the source's adapter: fetch the vault secret, let the factory
    /// refresh OAuth credentials, and persist a rotated refresh token before
    /// the adapter is used. The provider has already invalidated the old
    /// token by the time rotation is visible, so persist-before-use is the
    /// only safe ordering.
    async fn resolve(&self, source: &Source) -> Result<Box<dyn Connector>, SyncError> {
        let secret = self
            .vault
            .fetch(&source.id)
            .await?
            .ok_or(SyncError::NotConnected)?;

        let ready = self.factory.connect(source, &secret).await?;

        if let Some(rotated) = ready.rotated_secret {
            if let Err(e) = self.vault.store(&source.id, &rotated).await {
                warn!(source = %source.id, "failed to persist rotated refresh token: {}", e);
                return Err(SyncError::Db(e));
            }
            info!(source = %source.id, "refresh token rotated");
        }

        Ok(ready.connector)
    }

    /// Interactive connectivity check: list, filter, cap. Imports nothing.
    pub async fn test(&self, source: &Source) -> Result<Vec<RemoteFile>, SyncError> {
        let connector = self.resolve(source).await?;
        let files = connector.list().await?;
        let mut files = apply_glob_filter(files, source.config.glob.as_deref())?;
        files.truncate(TEST_LIST_LIMIT);
        Ok(files)
    }

    /// Import the requested items. Per-item isolation: every failure is
    /// confined to its item and the batch continues.
    pub async fn import(
        &self,
        source: &Source,
        files: &[ImportFile],
    ) -> Result<ImportReport, SyncError> {
        let connector = self.resolve(source).await?;
        Ok(self.import_with(source, connector.as_ref(), files).await)
    }

    async fn import_with(
        &self,
        source: &Source,
        connector: &dyn Connector,
        files: &[ImportFile],
    ) -> ImportReport {
        let mut inserted = 0;
        let mut results = Vec::with_capacity(files.len());

        for file in files {
            let result = self.import_item(source, connector, file).await;
            if result.status == ItemStatus::Imported {
                inserted += 1;
            }
            results.push(result);
        }

        ImportReport { inserted, results }
    }

    async fn import_item(
        &self,
        source: &Source,
        connector: &dyn Connector,
        file: &ImportFile,
    ) -> ItemResult {
        match self.try_import_item(source, connector, file).await {
            Ok(result) => result,
            Err(e) => ItemResult {
                id: file.id.clone(),
                status: ItemStatus::Error,
                document_id: None,
                message: Some(e),
            },
        }
    }

    async fn try_import_item(
        &self,
        source: &Source,
        connector: &dyn Connector,
        file: &ImportFile,
    ) -> Result<ItemResult, String> {
        let skipped = ItemResult {
            id: file.id.clone(),
            status: ItemStatus::Skipped,
            document_id: None,
            message: None,
        };

        if self
            .ledger
            .contains(&source.id, &file.id)
            .await
            .map_err(|e| e.to_string())?
        {
            return Ok(skipped);
        }

        let bytes = connector
            .download(&file.id)
            .await
            .map_err(|e| e.to_string())?;

        let document_id = self
            .pipeline
            .import(&source.tenant_id, &bytes, &file.name, source)
            .await
            .map_err(|e| e.to_string())?;

        let item = SourceItem::new(
            source.id.clone(),
            file.id.clone(),
            file.modified_at,
            file.size.or(Some(bytes.len() as i64)),
            document_id.clone(),
        );

        // A losing insert means another run (or an earlier duplicate in this
        // batch) imported the item first. That's SKIPPED, not an error.
        if self.ledger.record(&item).await.map_err(|e| e.to_string())? {
            Ok(ItemResult {
                id: file.id.clone(),
                status: ItemStatus::Imported,
                document_id: Some(document_id),
                message: None,
            })
        } else {
            Ok(skipped)
        }
    }

    /// Unattended run: list the whole feed and import everything new.
    ///
    /// Takes the per-source lease first; a concurrent holder means the run
    /// reports `AlreadyRunning` and touches nothing. Run bookkeeping follows
    /// the state machine: transient failures only record `last_error`, while
    /// auth-class provider failures also clear the vault secret, flipping the
    /// source to disconnected.
    pub async fn run_scheduled(&self, source: &Source) -> Result<RunOutcome, SyncError> {
        let holder = uuid::Uuid::new_v4().to_string();
        let ttl = Duration::minutes(LEASE_TTL_MINUTES);
        if !self.leases.try_acquire(&source.id, &holder, ttl).await? {
            return Ok(RunOutcome::AlreadyRunning);
        }

        let now = Utc::now();
        self.sources.mark_attempt(&source.id, now).await?;

        let outcome = self.run_once(source).await;
        self.leases.release(&source.id, &holder).await?;

        match outcome {
            Ok(report) => {
                info!(
                    source = %source.id,
                    inserted = report.inserted,
                    total = report.results.len(),
                    "scheduled sync completed"
                );
                self.sources.mark_run(&source.id, Utc::now(), None).await?;
                Ok(RunOutcome::Completed(report))
            }
            Err(e) => {
                if let SyncError::Connector(ConnectorError::Auth(_)) = &e {
                    warn!(source = %source.id, "credential rejected, disconnecting source");
                    self.vault.clear(&source.id).await?;
                }
                self.sources
                    .mark_run(&source.id, Utc::now(), Some(&e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn run_once(&self, source: &Source) -> Result<ImportReport, SyncError> {
        let connector = self.resolve(source).await?;
        let listed = connector.list().await?;
        let listed = apply_glob_filter(listed, source.config.glob.as_deref())?;

        let files: Vec<ImportFile> = listed
            .into_iter()
            .map(|f| ImportFile {
                id: f.id,
                name: f.name,
                modified_at: f.modified_at,
                size: f.size,
            })
            .collect();

        Ok(self.import_with(source, connector.as_ref(), &files).await)
    }

    /// Run every due source for a tenant, up to `limit`. Used by the
    /// cron-authenticated entry point.
    pub async fn run_due_for_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<(String, Result<RunOutcome, SyncError>)>, DieselError> {
        let now = Utc::now();
        let mut outcomes = Vec::new();

        for source in self.sources.get_for_tenant(tenant_id).await? {
            if outcomes.len() >= limit {
                break;
            }
            if !source.is_due(now) {
                continue;
            }
            if !self.vault.is_connected(&source.id).await? {
                continue;
            }
            let outcome = self.run_scheduled(&source).await;
            outcomes.push((source.id, outcome));
        }

        Ok(outcomes)
    }
}
