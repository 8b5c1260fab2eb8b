//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking over
//! SQLite, made async through diesel-async's SyncConnectionWrapper.

pub mod cron;
pub mod ledger;
pub mod lease;
pub mod migrations;
pub mod pool;
pub mod records;
pub mod source;
pub mod vault;

pub use cron::CronSecretRepository;
pub use ledger::SourceItemRepository;
pub use lease::LeaseRepository;
pub use pool::{AsyncSqlitePool, DieselError};
pub use source::SourceRepository;
pub use vault::SecretVault;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
