//! Source models for configured document feeds.
//!
//! A source is one recurring feed owned by a tenant: a provider, its
//! connection settings, and scheduling state. Sources are never hard-deleted;
//! disabling is the deletion substitute so the dedup ledger stays intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Floor for the sync schedule interval. Upserts clamp to this value.
pub const MIN_SCHEDULE_MINUTES: i32 = 5;

/// The closed set of supported feed providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceProvider {
    Sftp,
    Ftps,
    GoogleDrive,
    Onedrive,
}

impl SourceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sftp => "sftp",
            Self::Ftps => "ftps",
            Self::GoogleDrive => "google_drive",
            Self::Onedrive => "onedrive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sftp" => Some(Self::Sftp),
            "ftps" => Some(Self::Ftps),
            "google_drive" => Some(Self::GoogleDrive),
            "onedrive" => Some(Self::Onedrive),
            _ => None,
        }
    }

    /// OAuth-backed providers hold a refresh token in the vault instead of a
    /// password, and connect through the browser consent round trip.
    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::GoogleDrive | Self::Onedrive)
    }
}

/// Provider-specific connection settings, stored as a JSON blob on the row.
///
/// Which fields matter depends on the provider: host/port/username/root_path
/// for SFTP and FTPS, folder_id for the drive providers. The glob filter
/// applies to all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Server hostname (SFTP/FTPS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Server port; defaults to 22 for SFTP and 21 for FTPS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Login user (SFTP/FTPS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Remote directory to list (SFTP/FTPS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
    /// Remote folder id (Google Drive/OneDrive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Case-insensitive glob applied to remote filenames, e.g. `*.pdf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
}

/// A configured document feed owned by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub provider: SourceProvider,
    /// Admin-controlled axis of the state machine. Scheduled runs skip
    /// disabled sources; interactive calls still work against them.
    pub enabled: bool,
    pub schedule_minutes: i32,
    pub config: SourceConfig,
    pub created_at: DateTime<Utc>,
    /// Last run that completed without a fatal error.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Last run that started, successful or not.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Source {
    pub fn new(
        id: String,
        tenant_id: String,
        name: String,
        provider: SourceProvider,
        config: SourceConfig,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            provider,
            enabled: true,
            schedule_minutes: MIN_SCHEDULE_MINUTES,
            config,
            created_at: Utc::now(),
            last_run_at: None,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Whether a scheduled run is due: enabled, and the interval has elapsed
    /// since the last attempt (or no attempt has ever been made).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_attempt_at {
            None => true,
            Some(at) => now - at >= chrono::Duration::minutes(i64::from(self.schedule_minutes)),
        }
    }
}
