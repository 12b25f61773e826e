//! Profiles command - manage tracked profiles

use anyhow::{Context, Result, bail};
use profile_digest_domain::{NewProfile, ProfileKind, Store, StoreError};
use std::path::PathBuf;

use crate::args::{ProfilesArgs, ProfilesCommands};
use crate::commands::{find_user, open_store};
use crate::config::AppConfig;

pub async fn execute(args: ProfilesArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let store = open_store(&config).await?;

    match args.command {
        ProfilesCommands::Add {
            user,
            name,
            url,
            kind,
            automation_job,
        } => {
            let Some(kind) = ProfileKind::parse(&kind) else {
                bail!("Invalid profile kind: {} (expected person or company)", kind);
            };
            if url.trim().is_empty() {
                bail!("Profile URL must not be empty");
            }

            let user = store
                .find_or_create_user(&user)
                .await
                .context("Failed to create user")?;

            let profile = store
                .create_profile(&NewProfile {
                    user_id: user.id,
                    name,
                    source_url: url.trim().to_string(),
                    kind,
                    automation_job_id: automation_job.filter(|id| !id.trim().is_empty()),
                })
                .await
                .map_err(|e| match e {
                    StoreError::Conflict(message) => anyhow::anyhow!(message),
                    other => anyhow::Error::new(other).context("Failed to create profile"),
                })?;

            println!(
                "Added profile {} ({}) for {}",
                profile.id, profile.name, user.username
            );
        }
        ProfilesCommands::List { user, json } => {
            let user = find_user(&store, &user).await?;
            let profiles = store
                .list_profiles(user.id)
                .await
                .context("Failed to list profiles")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&profiles)?);
            } else if profiles.is_empty() {
                println!("No profiles tracked for {}", user.username);
            } else {
                for profile in &profiles {
                    println!(
                        "{:>4}  {:<24} {:<8} {}",
                        profile.id,
                        profile.name,
                        profile.kind.as_str(),
                        profile.source_url
                    );
                }
            }
        }
        ProfilesCommands::Remove { user, id } => {
            let user = find_user(&store, &user).await?;
            let removed = store
                .delete_profile(user.id, id)
                .await
                .context("Failed to delete profile")?;

            if !removed {
                bail!("No profile {} for user {}", id, user.username);
            }
            println!("Removed profile {} and its posts", id);
        }
    }

    Ok(())
}
