//! Dedup ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One imported remote file. The `(source_id, remote_id)` pair is unique in
/// the database; that constraint is what makes imports at-most-once under
/// retries and overlapping runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub source_id: String,
    /// Provider-specific file identifier (path for SFTP/FTPS, item id for the
    /// drive providers).
    pub remote_id: String,
    pub remote_modified: Option<DateTime<Utc>>,
    pub remote_size: Option<i64>,
    /// Document id returned by the import pipeline.
    pub document_id: String,
    pub imported_at: DateTime<Utc>,
}

impl SourceItem {
    pub fn new(
        source_id: String,
        remote_id: String,
        remote_modified: Option<DateTime<Utc>>,
        remote_size: Option<i64>,
        document_id: String,
    ) -> Self {
        Self {
            source_id,
            remote_id,
            remote_modified,
            remote_size,
            document_id,
            imported_at: Utc::now(),
        }
    }
}
