//! Import pipeline seam.
//!
//! The OCR/extraction pipeline that turns bytes into structured accounting
//! data lives outside this service; the connector framework only hands over
//! bytes and receives a document id. `FileStorePipeline` is the in-repo
//! implementation: it lands content in the document store and leaves
//! extraction to the downstream workers.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::Source;

/// Error types for document handoff.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The content itself was rejected (empty, oversized, wrong type).
    #[error("content rejected: {0}")]
    Invalid(String),
    #[error("pipeline failure: {0}")]
    Failed(String),
}

/// Receives downloaded bytes and returns the resulting document id.
#[async_trait]
pub trait ImportPipeline: Send + Sync {
    async fn import(
        &self,
        tenant_id: &str,
        bytes: &[u8],
        filename: &str,
        source: &Source,
    ) -> Result<String, PipelineError>;
}

/// Content-addressed file store handoff.
///
/// Layout: `{documents_dir}/{tenant}/{hash[0..2]}/{hash[0..8]}-{name}`, the
/// two-level hash-prefix structure keeping directories small.
pub struct FileStorePipeline {
    documents_dir: PathBuf,
}

impl FileStorePipeline {
    pub fn new(documents_dir: PathBuf) -> Self {
        Self { documents_dir }
    }

    fn storage_path(&self, tenant_id: &str, content_hash: &str, filename: &str) -> PathBuf {
        self.documents_dir
            .join(sanitize_filename(tenant_id))
            .join(&content_hash[..2])
            .join(format!(
                "{}-{}",
                &content_hash[..8],
                sanitize_filename(filename)
            ))
    }
}

#[async_trait]
impl ImportPipeline for FileStorePipeline {
    async fn import(
        &self,
        tenant_id: &str,
        bytes: &[u8],
        filename: &str,
        _source: &Source,
    ) -> Result<String, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Invalid("empty file".into()));
        }

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let content_hash = hex::encode(hasher.finalize());

        let path = self.storage_path(tenant_id, &content_hash, filename);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Failed(format!("mkdir {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Failed(format!("write {}: {}", path.display(), e)))?;

        Ok(uuid::Uuid::new_v4().to_string())
    }
}

/// Keep filenames filesystem-safe: alphanumerics, dash, underscore and dot
/// survive, everything else becomes an underscore.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
