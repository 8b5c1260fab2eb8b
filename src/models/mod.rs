//! Data models for ledgerfeed.

mod cron_secret;
mod source;
mod source_item;

pub use cron_secret::CronSecret;
pub use source::{Source, SourceConfig, SourceProvider, MIN_SCHEDULE_MINUTES};
pub use source_item::SourceItem;
