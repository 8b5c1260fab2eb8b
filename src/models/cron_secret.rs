//! Tenant cron credentials for unattended sync runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rotating secret per tenant. Only the peppered hash is stored; the raw
/// secret is handed out exactly once at rotation time and never again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSecret {
    pub tenant_id: String,
    /// Short non-secret prefix of the raw key, for display and audit logs.
    pub key_prefix: String,
    /// Hex-encoded peppered hash of the full raw key.
    pub secret_hash: String,
    pub enabled: bool,
    /// How many sources one unattended call may sync by default.
    pub default_run_limit: i32,
    pub last_used_at: Option<DateTime<Utc>>,
}
