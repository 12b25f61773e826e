//! profile-digest adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `sources`: Post sources (scraping API, automation job output, stub)
//! - `llm`: Classifier adapters (OpenAI-compatible, stub)
//! - `store`: SQLite persistence gateway
//! - `channels`: Email and chat webhook delivery

mod email;
mod store_sqlite;
mod webhook;

pub mod llm;
pub mod sources;

/// Re-exports for store adapters
pub mod store {
    pub use crate::store_sqlite::SqliteStore;
}

/// Re-exports for delivery channels
pub mod channels {
    pub use crate::email::{EmailChannel, subject_for};
    pub use crate::webhook::{WebhookChannel, build_payload};
}
