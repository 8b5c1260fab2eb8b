//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.

use diesel::prelude::*;

use crate::schema;

/// Source record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub provider: String,
    pub enabled: i32,
    pub schedule_minutes: i32,
    pub config: String,
    pub created_at: String,
    pub last_run_at: Option<String>,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
}

/// New source for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::sources)]
pub struct NewSource<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub name: &'a str,
    pub provider: &'a str,
    pub enabled: i32,
    pub schedule_minutes: i32,
    pub config: &'a str,
    pub created_at: &'a str,
    pub last_run_at: Option<&'a str>,
    pub last_attempt_at: Option<&'a str>,
    pub last_error: Option<&'a str>,
}

/// Source secret record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::source_secrets)]
#[diesel(primary_key(source_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceSecretRecord {
    pub source_id: String,
    pub secret: String,
    pub updated_at: String,
}

/// Dedup ledger record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::source_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceItemRecord {
    pub id: i32,
    pub source_id: String,
    pub remote_id: String,
    pub remote_modified: Option<String>,
    pub remote_size: Option<i64>,
    pub document_id: String,
    pub imported_at: String,
}

/// New ledger entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::source_items)]
pub struct NewSourceItem<'a> {
    pub source_id: &'a str,
    pub remote_id: &'a str,
    pub remote_modified: Option<&'a str>,
    pub remote_size: Option<i64>,
    pub document_id: &'a str,
    pub imported_at: &'a str,
}

/// Cron secret record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::cron_secrets)]
#[diesel(primary_key(tenant_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CronSecretRecord {
    pub tenant_id: String,
    pub key_prefix: String,
    pub secret_hash: String,
    pub enabled: i32,
    pub default_run_limit: i32,
    pub last_used_at: Option<String>,
    pub updated_at: String,
}

/// Sync lease record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::sync_leases)]
#[diesel(primary_key(source_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LeaseRecord {
    pub source_id: String,
    pub holder: String,
    pub expires_at: String,
}
