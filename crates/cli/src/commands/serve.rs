//! Serve command - scheduled daily job
//!
//! Recovers runs interrupted by a previous process, registers the daily job
//! with a [`JobScheduler`] and runs until Ctrl-C. Each tick repeats the
//! recovery before processing users.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::args::ServeArgs;
use crate::commands::open_store;
use crate::commands::run::{AppJob, build_job};
use crate::config::AppConfig;

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let cron = args.cron.unwrap_or_else(|| config.schedule.cron.clone());

    let store = open_store(&config).await?;
    let job = Arc::new(build_job(&config, store)?);

    recover_interrupted(&job).await;

    let mut scheduler = JobScheduler::new()
        .await
        .context("Failed to create scheduler")?;
    register_daily_job(&scheduler, &cron, Arc::clone(&job)).await?;
    scheduler.start().await.context("Failed to start scheduler")?;

    tracing::info!(cron = %cron, "Scheduler started; waiting for Ctrl-C");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    tracing::info!("Shutdown signal received");

    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;
    tracing::info!("profile-digest serve stopped");

    Ok(())
}

/// Finish runs whose process died; live runs of other processes keep their lease
async fn recover_interrupted(job: &AppJob) {
    match job.recover_interrupted_runs().await {
        Ok(reports) if !reports.is_empty() => {
            tracing::info!(recovered = reports.len(), "Recovered interrupted runs");
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Failed to recover interrupted runs"),
    }
}

async fn register_daily_job(scheduler: &JobScheduler, cron: &str, job: Arc<AppJob>) -> Result<()> {
    let scheduled = Job::new_async(cron, move |_uuid, _lock| {
        let job = Arc::clone(&job);

        Box::pin(async move {
            tracing::info!("scheduler: starting daily job");
            recover_interrupted(&job).await;
            match job.run_all_users_job().await {
                Ok(results) => {
                    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                    tracing::info!(
                        users = results.len(),
                        failed,
                        "scheduler: daily job complete"
                    );
                }
                Err(e) => tracing::error!(error = %e, "scheduler: daily job failed"),
            }
        })
    })
    .with_context(|| format!("Invalid cron expression: {}", cron))?;

    scheduler
        .add(scheduled)
        .await
        .context("Failed to register daily job")?;
    Ok(())
}
