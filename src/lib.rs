//! ledgerfeed - external document feed connectors and sync.
//!
//! Lets a tenant of the accounting platform attach SFTP, FTPS, Google Drive
//! or OneDrive locations as recurring document feeds: heterogeneous provider
//! authentication, safe credential storage, interactive testing, unattended
//! scheduled runs, and at-most-once import into the document store.

pub mod cli;
pub mod config;
pub mod connectors;
pub mod models;
pub mod oauth;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
