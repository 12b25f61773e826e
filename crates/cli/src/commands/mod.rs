//! Subcommand implementations

pub mod classify;
pub mod config;
pub mod doctor;
pub mod notifications;
pub mod profiles;
pub mod run;
pub mod serve;
pub mod settings;

use anyhow::{Context, Result};
use profile_digest_adapters::store::SqliteStore;
use profile_digest_domain::{Store, User};
use std::sync::Arc;

use crate::config::AppConfig;

/// Open the configured database, creating it if needed
pub(crate) async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::new(&config.general.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                config.general.database_path.display()
            )
        })?;
    Ok(Arc::new(store))
}

/// Look up an existing user by name
pub(crate) async fn find_user(store: &SqliteStore, username: &str) -> Result<User> {
    store
        .list_users()
        .await
        .context("Failed to list users")?
        .into_iter()
        .find(|u| u.username == username)
        .with_context(|| format!("Unknown user: {}", username))
}
