//! Settings command - per-user email delivery settings

use anyhow::{Context, Result, bail};
use profile_digest_domain::{Store, setting_keys};
use std::path::PathBuf;

use crate::args::{SettingsArgs, SettingsCommands};
use crate::commands::{find_user, open_store};
use crate::config::AppConfig;

pub async fn execute(args: SettingsArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let store = open_store(&config).await?;

    match args.command {
        SettingsCommands::Set { user, key, value } => {
            if !setting_keys::ALL.contains(&key.as_str()) {
                bail!(
                    "Unknown setting {} (expected one of: {})",
                    key,
                    setting_keys::ALL.join(", ")
                );
            }
            if key == setting_keys::SMTP_PORT && value.trim().parse::<u16>().is_err() {
                bail!("smtp_port must be a port number, got {}", value);
            }

            let user = store
                .find_or_create_user(&user)
                .await
                .context("Failed to create user")?;
            store
                .set_setting(user.id, &key, value.trim())
                .await
                .context("Failed to store setting")?;

            println!("Set {} for {}", key, user.username);
        }
        SettingsCommands::Email { user } => {
            let user = find_user(&store, &user).await?;
            let settings = store
                .load_email_settings(user.id)
                .await
                .context("Failed to load email settings")?;

            let show = |value: &Option<String>| {
                value.clone().unwrap_or_else(|| "(not set)".to_string())
            };
            println!("Email settings for {}", user.username);
            println!("  notify_email:  {}", show(&settings.notify_email));
            println!("  smtp_host:     {}", show(&settings.smtp_host));
            println!(
                "  smtp_port:     {}",
                settings
                    .smtp_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(invalid)".to_string())
            );
            println!("  smtp_user:     {}", show(&settings.smtp_user));
            println!(
                "  smtp_password: {}",
                if settings.smtp_password.is_some() { "********" } else { "(not set)" }
            );

            let missing = settings.missing_fields();
            if missing.is_empty() {
                println!("Email delivery: enabled");
            } else {
                println!("Email delivery: disabled (missing {})", missing.join(", "));
            }
        }
    }

    Ok(())
}
