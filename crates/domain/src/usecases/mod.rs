//! Application use cases / business logic

pub mod classify;
pub mod daily_job;
pub mod dedup;
pub mod digest;
pub mod dispatch;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::ResilientClassifier;
pub use daily_job::{DailyJob, DailyJobConfig, RunError};
pub use dedup::Deduplicator;
pub use digest::DigestBuilder;
pub use dispatch::{DispatchError, NotificationDispatcher};
pub use retry::{BackoffPolicy, retry_with_backoff};
