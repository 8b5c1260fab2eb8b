//! End-to-end sync engine behavior against a real SQLite database, with the
//! provider faked at the connector-factory seam.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use ledgerfeed::connectors::{
    Connector, ConnectorError, ConnectorFactory, ReadyConnector, RemoteFile,
};
use ledgerfeed::models::{Source, SourceConfig, SourceProvider};
use ledgerfeed::repository::{
    migrations, AsyncSqlitePool, LeaseRepository, SecretVault, SourceItemRepository,
    SourceRepository,
};
use ledgerfeed::services::{
    FileStorePipeline, ImportFile, ItemStatus, RunOutcome, SyncEngine, SyncError,
};

#[derive(Clone, Default)]
struct FakeConnector {
    files: Vec<RemoteFile>,
    fail_downloads: HashSet<String>,
    fail_list_with_auth: bool,
    fail_list_with_provider: bool,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn list(&self) -> Result<Vec<RemoteFile>, ConnectorError> {
        if self.fail_list_with_auth {
            return Err(ConnectorError::Auth("token revoked".into()));
        }
        if self.fail_list_with_provider {
            return Err(ConnectorError::Provider("connection reset".into()));
        }
        Ok(self.files.clone())
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError> {
        if self.fail_downloads.contains(remote_id) {
            return Err(ConnectorError::Provider("download exploded".into()));
        }
        Ok(format!("contents of {}", remote_id).into_bytes())
    }
}

struct FakeFactory {
    connector: FakeConnector,
    rotate_to: Option<String>,
}

impl FakeFactory {
    fn new(connector: FakeConnector) -> Self {
        Self {
            connector,
            rotate_to: None,
        }
    }
}

#[async_trait]
impl ConnectorFactory for FakeFactory {
    async fn connect(
        &self,
        _source: &Source,
        _secret: &str,
    ) -> Result<ReadyConnector, ConnectorError> {
        Ok(ReadyConnector {
            connector: Box::new(self.connector.clone()),
            rotated_secret: self.rotate_to.clone(),
        })
    }
}

struct Fixture {
    sources: SourceRepository,
    vault: SecretVault,
    ledger: SourceItemRepository,
    leases: LeaseRepository,
    engine: SyncEngine,
    _dir: tempfile::TempDir,
}

async fn fixture_with(factory: FakeFactory) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
    migrations::init_schema(&pool).await.unwrap();

    let engine = SyncEngine::new(
        SourceRepository::new(pool.clone()),
        SecretVault::new(pool.clone()),
        SourceItemRepository::new(pool.clone()),
        LeaseRepository::new(pool.clone()),
        Arc::new(factory),
        Arc::new(FileStorePipeline::new(dir.path().join("documents"))),
    );

    Fixture {
        sources: SourceRepository::new(pool.clone()),
        vault: SecretVault::new(pool.clone()),
        ledger: SourceItemRepository::new(pool.clone()),
        leases: LeaseRepository::new(pool),
        engine,
        _dir: dir,
    }
}

fn remote(id: &str, name: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: name.to_string(),
        modified_at: Some(Utc::now()),
        size: Some(128),
    }
}

fn request(id: &str, name: &str) -> ImportFile {
    ImportFile {
        id: id.to_string(),
        name: name.to_string(),
        modified_at: None,
        size: None,
    }
}

async fn connected_source(fixture: &Fixture, glob: Option<&str>) -> Source {
    let source = Source::new(
        "src-1".into(),
        "tenant-1".into(),
        "Supplier inbox".into(),
        SourceProvider::Sftp,
        SourceConfig {
            host: Some("files.example.com".into()),
            username: Some("acct".into()),
            glob: glob.map(|g| g.to_string()),
            ..SourceConfig::default()
        },
    );
    fixture.sources.save(&source).await.unwrap();
    fixture.vault.store(&source.id, "password").await.unwrap();
    fixture.sources.get(&source.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn import_is_idempotent_across_calls() {
    let connector = FakeConnector {
        files: vec![remote("r1", "a.pdf")],
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;
    let source = connected_source(&fixture, None).await;

    let first = fixture
        .engine
        .import(&source, &[request("r1", "a.pdf")])
        .await
        .unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(first.results[0].status, ItemStatus::Imported);
    let document_id = first.results[0].document_id.clone().unwrap();

    let second = fixture
        .engine
        .import(&source, &[request("r1", "a.pdf")])
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.results[0].status, ItemStatus::Skipped);
    assert!(second.results[0].document_id.is_none());

    // One ledger row, one document
    assert_eq!(fixture.ledger.count_for_source(&source.id).await.unwrap(), 1);
    assert!(!document_id.is_empty());
}

#[tokio::test]
async fn partial_batch_failure_is_isolated() {
    let connector = FakeConnector {
        files: vec![remote("r1", "a.pdf"), remote("r2", "b.pdf"), remote("r3", "c.pdf")],
        fail_downloads: ["r2".to_string()].into_iter().collect(),
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;
    let source = connected_source(&fixture, None).await;

    let report = fixture
        .engine
        .import(
            &source,
            &[
                request("r1", "a.pdf"),
                request("r2", "b.pdf"),
                request("r3", "c.pdf"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.inserted, 2);
    let statuses: Vec<_> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ItemStatus::Imported, ItemStatus::Error, ItemStatus::Imported]
    );
    assert!(report.results[1]
        .message
        .as_deref()
        .unwrap()
        .contains("exploded"));

    // The failed item is not in the ledger and can be retried later
    assert!(!fixture.ledger.contains(&source.id, "r2").await.unwrap());
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_import_once() {
    let fixture = fixture_with(FakeFactory::new(FakeConnector::default())).await;
    let source = connected_source(&fixture, None).await;

    let report = fixture
        .engine
        .import(&source, &[request("r1", "a.pdf"), request("r1", "a.pdf")])
        .await
        .unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(report.results[0].status, ItemStatus::Imported);
    assert_eq!(report.results[1].status, ItemStatus::Skipped);
}

#[tokio::test]
async fn import_requires_connection() {
    let fixture = fixture_with(FakeFactory::new(FakeConnector::default())).await;
    let source = Source::new(
        "src-1".into(),
        "tenant-1".into(),
        "Feed".into(),
        SourceProvider::Sftp,
        SourceConfig::default(),
    );
    fixture.sources.save(&source).await.unwrap();

    let err = fixture
        .engine
        .import(&source, &[request("r1", "a.pdf")])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotConnected));
}

#[tokio::test]
async fn scheduled_run_imports_filtered_listing() {
    let connector = FakeConnector {
        files: vec![
            remote("r1", "invoice.PDF"),
            remote("r2", "notes.txt"),
            remote("r3", "receipt.pdf"),
        ],
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;
    let source = connected_source(&fixture, Some("*.pdf")).await;

    let outcome = fixture.engine.run_scheduled(&source).await.unwrap();
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };

    assert_eq!(report.inserted, 2);
    assert!(fixture.ledger.contains(&source.id, "r1").await.unwrap());
    assert!(!fixture.ledger.contains(&source.id, "r2").await.unwrap());
    assert!(fixture.ledger.contains(&source.id, "r3").await.unwrap());

    let source = fixture.sources.get(&source.id).await.unwrap().unwrap();
    assert!(source.last_run_at.is_some());
    assert!(source.last_attempt_at.is_some());
    assert!(source.last_error.is_none());
}

#[tokio::test]
async fn transient_failure_keeps_source_connected() {
    let connector = FakeConnector {
        fail_list_with_provider: true,
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;
    let source = connected_source(&fixture, None).await;

    let err = fixture.engine.run_scheduled(&source).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Connector(ConnectorError::Provider(_))
    ));

    // Error detail is recorded, but neither axis of the state machine flips
    let reloaded = fixture.sources.get(&source.id).await.unwrap().unwrap();
    assert!(reloaded.enabled);
    assert!(reloaded.last_error.is_some());
    assert!(fixture.vault.is_connected(&source.id).await.unwrap());
}

#[tokio::test]
async fn auth_failure_disconnects_source() {
    let connector = FakeConnector {
        fail_list_with_auth: true,
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;
    let source = connected_source(&fixture, None).await;

    let err = fixture.engine.run_scheduled(&source).await.unwrap_err();
    assert!(matches!(err, SyncError::Connector(ConnectorError::Auth(_))));

    // Credential cleared, source survives and stays enabled
    assert!(!fixture.vault.is_connected(&source.id).await.unwrap());
    let reloaded = fixture.sources.get(&source.id).await.unwrap().unwrap();
    assert!(reloaded.enabled);
    assert!(reloaded.last_error.is_some());
}

#[tokio::test]
async fn held_lease_skips_scheduled_run() {
    let connector = FakeConnector {
        files: vec![remote("r1", "a.pdf")],
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;
    let source = connected_source(&fixture, None).await;

    assert!(fixture
        .leases
        .try_acquire(&source.id, "other-run", Duration::minutes(10))
        .await
        .unwrap());

    let outcome = fixture.engine.run_scheduled(&source).await.unwrap();
    assert!(matches!(outcome, RunOutcome::AlreadyRunning));
    assert_eq!(fixture.ledger.count_for_source(&source.id).await.unwrap(), 0);

    // Once the holder releases, the run proceeds
    fixture.leases.release(&source.id, "other-run").await.unwrap();
    let outcome = fixture.engine.run_scheduled(&source).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(fixture.ledger.count_for_source(&source.id).await.unwrap(), 1);
}

#[tokio::test]
async fn rotated_refresh_credential_is_persisted_before_use() {
    let connector = FakeConnector {
        files: vec![remote("r1", "a.pdf")],
        ..FakeConnector::default()
    };
    let mut factory = FakeFactory::new(connector);
    factory.rotate_to = Some("new1-rotated-refresh-token".to_string());

    let fixture = fixture_with(factory).await;
    let source = connected_source(&fixture, None).await;

    fixture.engine.test(&source).await.unwrap();

    // The vault now holds the rotated credential; the fingerprint proves it
    // without exposing the raw value.
    let fingerprint = fixture.vault.fingerprint(&source.id).await.unwrap().unwrap();
    assert!(fingerprint.starts_with("new1"));
}

#[tokio::test]
async fn run_due_skips_disabled_and_disconnected_sources() {
    let connector = FakeConnector {
        files: vec![remote("r1", "a.pdf")],
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;

    // Due and connected
    let due = connected_source(&fixture, None).await;

    // Disabled
    let mut disabled = Source::new(
        "src-disabled".into(),
        "tenant-1".into(),
        "Disabled".into(),
        SourceProvider::Sftp,
        SourceConfig::default(),
    );
    disabled.enabled = false;
    fixture.sources.save(&disabled).await.unwrap();
    fixture.vault.store(&disabled.id, "pw").await.unwrap();

    // Enabled but never connected
    let disconnected = Source::new(
        "src-disconnected".into(),
        "tenant-1".into(),
        "Disconnected".into(),
        SourceProvider::Sftp,
        SourceConfig::default(),
    );
    fixture.sources.save(&disconnected).await.unwrap();

    let outcomes = fixture
        .engine
        .run_due_for_tenant("tenant-1", 10)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, due.id);
    assert!(matches!(outcomes[0].1, Ok(RunOutcome::Completed(_))));
}

#[tokio::test]
async fn run_due_honors_limit() {
    let connector = FakeConnector {
        files: vec![remote("r1", "a.pdf")],
        ..FakeConnector::default()
    };
    let fixture = fixture_with(FakeFactory::new(connector)).await;

    for i in 0..3 {
        let source = Source::new(
            format!("src-{}", i),
            "tenant-1".into(),
            format!("Feed {}", i),
            SourceProvider::Sftp,
            SourceConfig::default(),
        );
        fixture.sources.save(&source).await.unwrap();
        fixture.vault.store(&source.id, "pw").await.unwrap();
    }

    let outcomes = fixture
        .engine
        .run_due_for_tenant("tenant-1", 2)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
}
