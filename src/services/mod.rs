//! Service layer: the sync engine, the cron authenticator, and the trait
//! seams to the platform collaborators (import pipeline, membership,
//! entitlements).

pub mod access;
pub mod cron;
pub mod pipeline;
pub mod sync;

pub use access::{Entitlements, StaticAccess, TenantDirectory, DOCUMENT_FEEDS_CAPABILITY};
pub use cron::{CronAuthenticator, CronStatus};
pub use pipeline::{FileStorePipeline, ImportPipeline, PipelineError};
pub use sync::{ImportFile, ImportReport, ItemResult, ItemStatus, RunOutcome, SyncEngine, SyncError};
