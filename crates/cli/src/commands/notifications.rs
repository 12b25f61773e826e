//! Notifications command - read digest notifications

use anyhow::{Context, Result, bail};
use profile_digest_domain::Store;
use std::path::PathBuf;

use crate::args::{NotificationsArgs, NotificationsCommands};
use crate::commands::{find_user, open_store};
use crate::config::AppConfig;

pub async fn execute(args: NotificationsArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let store = open_store(&config).await?;

    match args.command {
        NotificationsCommands::List { user, limit, json } => {
            let user = find_user(&store, &user).await?;
            let notifications = store
                .list_notifications(user.id, limit)
                .await
                .context("Failed to list notifications")?;
            let unread = store
                .unread_count(user.id)
                .await
                .context("Failed to count unread notifications")?;

            if json {
                let output = serde_json::json!({
                    "unread": unread,
                    "notifications": notifications,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            println!("{} unread", unread);
            for notification in &notifications {
                let marker = if notification.is_read { " " } else { "*" };
                println!(
                    "{} {:>4}  {}  {}",
                    marker, notification.id, notification.created_at, notification.title
                );
            }
        }
        NotificationsCommands::Read { user, id, all } => {
            let user = find_user(&store, &user).await?;

            if all {
                let count = store
                    .mark_all_notifications_read(user.id)
                    .await
                    .context("Failed to mark notifications read")?;
                println!("Marked {} notification(s) as read", count);
            } else if let Some(id) = id {
                let found = store
                    .mark_notification_read(user.id, id)
                    .await
                    .context("Failed to mark notification read")?;
                if !found {
                    bail!("No notification {} for user {}", id, user.username);
                }
                println!("Marked notification {} as read", id);
            } else {
                bail!("Either --id or --all is required");
            }
        }
    }

    Ok(())
}
