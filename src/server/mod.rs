//! HTTP server for the connector framework.
//!
//! Every handler is a single independent request/response; all cross-request
//! state lives in the repositories or inside the signed OAuth state token,
//! so instances scale horizontally with no coordination.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::connectors::ProviderRegistry;
use crate::oauth::OAuthClient;
use crate::repository::{
    migrations, AsyncSqlitePool, CronSecretRepository, LeaseRepository, SecretVault,
    SourceItemRepository, SourceRepository,
};
use crate::services::{
    CronAuthenticator, Entitlements, FileStorePipeline, StaticAccess, SyncEngine, TenantDirectory,
};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub sources: Arc<SourceRepository>,
    pub vault: Arc<SecretVault>,
    pub engine: Arc<SyncEngine>,
    pub cron: Arc<CronAuthenticator>,
    pub oauth: Arc<OAuthClient>,
    pub directory: Arc<dyn TenantDirectory>,
    pub entitlements: Arc<dyn Entitlements>,
    /// MAC key for OAuth state tokens.
    pub state_key: [u8; 32],
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&settings.data_dir)?;
        let pool = AsyncSqlitePool::from_path(&settings.database_path());
        migrations::init_schema(&pool).await?;

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        let (google, microsoft) = settings.oauth_apps();
        let oauth = Arc::new(OAuthClient::new(
            http.clone(),
            google,
            microsoft,
            settings.oauth_redirect_uri(),
        ));

        let factory = Arc::new(ProviderRegistry::new(
            http,
            oauth.clone(),
            settings.request_timeout(),
        ));
        let pipeline = Arc::new(FileStorePipeline::new(settings.documents_dir()));
        let access = Arc::new(StaticAccess::new(
            settings.tenant_admins.clone(),
            settings.tenant_capabilities.clone(),
        ));

        let sources = Arc::new(SourceRepository::new(pool.clone()));
        let vault = Arc::new(SecretVault::new(pool.clone()));
        let engine = Arc::new(SyncEngine::new(
            SourceRepository::new(pool.clone()),
            SecretVault::new(pool.clone()),
            SourceItemRepository::new(pool.clone()),
            LeaseRepository::new(pool.clone()),
            factory,
            pipeline,
        ));
        let cron = Arc::new(CronAuthenticator::new(
            CronSecretRepository::new(pool),
            &settings.cron_pepper,
            settings.global_cron_key.clone(),
        ));

        Ok(Self {
            sources,
            vault,
            engine,
            cron,
            oauth,
            directory: access.clone(),
            entitlements: access,
            state_key: settings.state_mac_key(),
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings).await?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
