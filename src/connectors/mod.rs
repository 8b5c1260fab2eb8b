//! Provider adapters for remote document feeds.
//!
//! Every provider speaks the same narrow contract: list the files at the
//! configured location, download one by its remote id. SFTP and FTPS
//! authenticate with stored credentials over blocking protocol libraries
//! (driven via spawn_blocking); Google Drive and OneDrive go through reqwest
//! with an OAuth access token minted by the factory.
//!
//! The provider set is closed: adapters are only constructed by
//! [`ProviderRegistry`], which matches on [`SourceProvider`].

pub mod ftps;
pub mod google_drive;
pub mod onedrive;
pub mod sftp;

pub use ftps::FtpsConnector;
pub use google_drive::GoogleDriveConnector;
pub use onedrive::OneDriveConnector;
pub use sftp::SftpConnector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Source, SourceProvider};
use crate::oauth::OAuthClient;

/// Cap on entries returned by interactive test listings.
pub const TEST_LIST_LIMIT: usize = 25;

/// Error types for provider operations.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The source's own configuration is incomplete (missing host, folder id,
    /// OAuth client credentials, ...). A setup problem, not a provider fault.
    #[error("configuration error: {0}")]
    Config(String),
    /// The stored credential was rejected. Callers mark the source
    /// disconnected instead of retrying blindly.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Network trouble, unexpected responses, rate limits. Transient from the
    /// source's point of view.
    #[error("provider error: {0}")]
    Provider(String),
    #[error("operation timed out")]
    Timeout,
}

/// A file visible through a provider's listing operation.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteFile {
    /// Provider-specific identifier, also the download handle.
    pub id: String,
    pub name: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub size: Option<i64>,
}

/// Uniform list/download contract implemented by every provider adapter.
#[async_trait]
pub trait Connector: Send + Sync {
    /// List the files at the configured location. Directories are excluded.
    async fn list(&self) -> Result<Vec<RemoteFile>, ConnectorError>;

    /// Download one file's bytes by remote id.
    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError>;
}

/// A connector ready for use, plus a rotated refresh credential when the
/// provider replaced it during token refresh. The caller must persist the
/// rotated credential before issuing any adapter call.
pub struct ReadyConnector {
    pub connector: Box<dyn Connector>,
    pub rotated_secret: Option<String>,
}

/// Seam for building adapters from a source and its vault secret. The
/// production implementation is [`ProviderRegistry`]; tests substitute fakes.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connect(
        &self,
        source: &Source,
        secret: &str,
    ) -> Result<ReadyConnector, ConnectorError>;
}

/// Production factory over the closed provider set.
pub struct ProviderRegistry {
    http: reqwest::Client,
    oauth: Arc<OAuthClient>,
    timeout: Duration,
}

impl ProviderRegistry {
    pub fn new(http: reqwest::Client, oauth: Arc<OAuthClient>, timeout: Duration) -> Self {
        Self {
            http,
            oauth,
            timeout,
        }
    }
}

#[async_trait]
impl ConnectorFactory for ProviderRegistry {
    async fn connect(
        &self,
        source: &Source,
        secret: &str,
    ) -> Result<ReadyConnector, ConnectorError> {
        match source.provider {
            SourceProvider::Sftp => Ok(ReadyConnector {
                connector: Box::new(SftpConnector::from_source(source, secret, self.timeout)?),
                rotated_secret: None,
            }),
            SourceProvider::Ftps => Ok(ReadyConnector {
                connector: Box::new(FtpsConnector::from_source(source, secret, self.timeout)?),
                rotated_secret: None,
            }),
            SourceProvider::GoogleDrive | SourceProvider::Onedrive => {
                let token = self
                    .oauth
                    .refresh(source.provider, secret)
                    .await
                    .map_err(ConnectorError::from)?;

                let folder_id = source
                    .config
                    .folder_id
                    .clone()
                    .ok_or_else(|| ConnectorError::Config("folder_id is not set".into()))?;

                let connector: Box<dyn Connector> = match source.provider {
                    SourceProvider::GoogleDrive => Box::new(GoogleDriveConnector::new(
                        self.http.clone(),
                        token.access_token.clone(),
                        folder_id,
                    )),
                    _ => Box::new(OneDriveConnector::new(
                        self.http.clone(),
                        token.access_token.clone(),
                        folder_id,
                    )),
                };

                Ok(ReadyConnector {
                    connector,
                    rotated_secret: token.refresh_token,
                })
            }
        }
    }
}

/// Apply the source's case-insensitive glob filter to a listing.
///
/// A missing or empty glob passes everything through; an invalid glob is a
/// configuration error surfaced to the admin.
pub fn apply_glob_filter(
    files: Vec<RemoteFile>,
    glob: Option<&str>,
) -> Result<Vec<RemoteFile>, ConnectorError> {
    let pattern = match glob {
        Some(p) if !p.trim().is_empty() => p.trim(),
        _ => return Ok(files),
    };

    let matcher = GlobBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConnectorError::Config(format!("invalid glob '{}': {}", pattern, e)))?
        .compile_matcher();

    Ok(files
        .into_iter()
        .filter(|f| matcher.is_match(&f.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> RemoteFile {
        RemoteFile {
            id: format!("id-{}", name),
            name: name.to_string(),
            modified_at: None,
            size: None,
        }
    }

    #[test]
    fn test_glob_filter_case_insensitive() {
        let files = vec![
            file("invoice.pdf"),
            file("SCAN.PDF"),
            file("notes.txt"),
            file("statement.Pdf"),
        ];

        let kept = apply_glob_filter(files, Some("*.pdf")).unwrap();
        let names: Vec<_> = kept.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["invoice.pdf", "SCAN.PDF", "statement.Pdf"]);
    }

    #[test]
    fn test_glob_filter_empty_passes_all() {
        let files = vec![file("a.pdf"), file("b.txt")];
        assert_eq!(apply_glob_filter(files.clone(), None).unwrap().len(), 2);
        assert_eq!(apply_glob_filter(files, Some("  ")).unwrap().len(), 2);
    }

    #[test]
    fn test_glob_filter_invalid_pattern_is_config_error() {
        let err = apply_glob_filter(vec![file("a.pdf")], Some("[")).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }
}
