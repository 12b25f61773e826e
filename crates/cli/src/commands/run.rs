//! Run command - execute the daily job on demand

use anyhow::{Context, Result, bail};
use profile_digest_adapters::channels::{EmailChannel, WebhookChannel};
use profile_digest_adapters::sources::{
    AutomationJobConfig, AutomationJobSource, ScraperApiConfig, ScraperApiSource, StubPostSource,
};
use profile_digest_adapters::store::SqliteStore;
use profile_digest_domain::usecases::{DailyJob, DailyJobConfig, NotificationDispatcher};
use profile_digest_domain::{
    ChannelOutcome, Classifier, Clock, DigestChannel, PostSource, ProfileOutcome, RunReport,
    SystemClock,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::args::RunArgs;
use crate::commands::classify::build_classifier;
use crate::commands::{find_user, open_store};
use crate::config::{AppConfig, load_env, load_secret};

/// The daily job as wired by the binary
pub(crate) type AppJob = DailyJob<dyn PostSource, dyn Classifier, SqliteStore, SystemClock>;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let store = open_store(&config).await?;
    let job = build_job(&config, Arc::clone(&store))?;

    if args.all {
        let results = job
            .run_all_users_job()
            .await
            .context("Failed to run daily job for all users")?;

        let mut summaries = Vec::with_capacity(results.len());
        for (user, result) in results {
            match result {
                Ok(report) => summaries.push(RunSummary::from_report(&user.username, &report)),
                Err(e) => summaries.push(RunSummary::failed(&user.username, &e.to_string())),
            }
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            for summary in &summaries {
                print_summary(summary);
            }
        }
        return Ok(());
    }

    let Some(username) = args.user.as_deref() else {
        bail!("Either --user or --all is required");
    };
    let user = find_user(&store, username).await?;

    let report = job
        .run_daily_job(user.id)
        .await
        .with_context(|| format!("Daily job failed for user {}", username))?;

    let summary = RunSummary::from_report(username, &report);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

pub(crate) fn build_job(config: &AppConfig, store: Arc<SqliteStore>) -> Result<AppJob> {
    let clock = Arc::new(SystemClock);
    let post_source = build_post_source(config, clock.clone())?;
    let classifier = build_classifier(config)?;

    let webhook = WebhookChannel::new(load_env(&config.webhook.url_env));
    if !webhook.is_configured() {
        tracing::debug!(
            env = %config.webhook.url_env,
            "Webhook URL not set; webhook delivery disabled"
        );
    }
    let channels: Vec<Arc<dyn DigestChannel>> =
        vec![Arc::new(EmailChannel::new()), Arc::new(webhook)];
    let dispatcher = NotificationDispatcher::new(Arc::clone(&store), Arc::clone(&clock), channels);

    let job_config =
        DailyJobConfig::with_call_timeout(Duration::from_secs(config.general.run_timeout_secs));

    Ok(DailyJob::new(
        post_source,
        classifier,
        store,
        clock,
        dispatcher,
        job_config,
    ))
}

pub(crate) fn build_post_source(
    config: &AppConfig,
    clock: Arc<SystemClock>,
) -> Result<Arc<dyn PostSource>> {
    let clock: Arc<dyn Clock> = clock;

    match config.source.provider.as_str() {
        "scraper_api" => {
            let settings = &config.source.scraper_api;
            let api_key = load_secret(&settings.api_key_env);
            if api_key.is_none() {
                tracing::warn!(
                    env = %settings.api_key_env,
                    "Scraper API key not set; profiles will yield no posts"
                );
            }
            Ok(Arc::new(ScraperApiSource::new(
                api_key,
                ScraperApiConfig {
                    base_url: settings.base_url.clone(),
                    host: settings.host.clone(),
                    pause: Duration::from_millis(settings.pause_ms),
                    ..Default::default()
                },
                clock,
            )))
        }
        "automation_job" => {
            let settings = &config.source.automation_job;
            let api_key = load_secret(&settings.api_key_env);
            if api_key.is_none() {
                tracing::warn!(
                    env = %settings.api_key_env,
                    "Automation API key not set; profiles will yield no posts"
                );
            }
            Ok(Arc::new(AutomationJobSource::new(
                api_key,
                AutomationJobConfig {
                    base_url: settings.base_url.clone(),
                    ..Default::default()
                },
                clock,
            )))
        }
        "stub" => Ok(Arc::new(StubPostSource::sample(clock))),
        other => bail!("Unknown post source provider: {}", other),
    }
}

#[derive(Debug, Serialize)]
struct RunSummary {
    user: String,
    run_id: Option<String>,
    new_posts: usize,
    failed_profiles: Vec<String>,
    digest_title: Option<String>,
    channels: Vec<(String, ChannelOutcome)>,
    error: Option<String>,
}

impl RunSummary {
    fn from_report(username: &str, report: &RunReport) -> Self {
        let failed_profiles = report
            .profiles
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                ProfileOutcome::Failed { error, .. } => Some(format!("{}: {}", name, error)),
                _ => None,
            })
            .collect();

        Self {
            user: username.to_string(),
            run_id: Some(report.run_id.to_string()),
            new_posts: report.new_posts(),
            failed_profiles,
            digest_title: Some(report.digest.title.clone()),
            channels: report.delivery.channels.clone(),
            error: None,
        }
    }

    fn failed(username: &str, error: &str) -> Self {
        Self {
            user: username.to_string(),
            run_id: None,
            new_posts: 0,
            failed_profiles: Vec::new(),
            digest_title: None,
            channels: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if let Some(error) = &summary.error {
        println!("[{}] run failed: {}", summary.user, error);
        return;
    }

    println!(
        "[{}] {}",
        summary.user,
        summary.digest_title.as_deref().unwrap_or_default()
    );
    println!("  New posts: {}", summary.new_posts);
    for failure in &summary.failed_profiles {
        println!("  Failed profile: {}", failure);
    }
    for (channel, outcome) in &summary.channels {
        match outcome {
            ChannelOutcome::Delivered => println!("  {}: delivered", channel),
            ChannelOutcome::Skipped { reason } => println!("  {}: skipped ({})", channel, reason),
            ChannelOutcome::Failed { reason } => println!("  {}: FAILED ({})", channel, reason),
        }
    }
}
