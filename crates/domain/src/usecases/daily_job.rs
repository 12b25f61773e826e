//! Daily job use case - orchestrates fetching, deduplicating, classifying,
//! persisting and dispatching for one user or for all users
//!
//! A run holds a per-user lease in the store for its whole lifetime. The lease
//! is renewed before every bounded call and outlives any single call, so a
//! second trigger (another process included) sees it and backs off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    compute_fingerprint,
    model::{
        DigestEntry, EmailSettings, InsertOutcome, JobRun, NewPost, Post, Profile, ProfileOutcome,
        RunReport, RunState, User, UserId,
    },
    policy::LookbackWindow,
    ports::{Classifier, ClassifyError, Clock, PostSource, Store, StoreError},
    usecases::{
        dedup::Deduplicator,
        digest::DigestBuilder,
        dispatch::{DispatchError, NotificationDispatcher},
    },
};

/// Configuration for the daily job
#[derive(Debug, Clone)]
pub struct DailyJobConfig {
    /// Window applied to fetched posts before classification
    pub window: LookbackWindow,
    /// Deadline applied to each fetch and each classification
    pub call_timeout: Duration,
    /// Lifetime of a run lease between renewals; must exceed `call_timeout`
    pub lease_ttl: Duration,
}

impl DailyJobConfig {
    /// Config with the given call deadline and a lease twice as long
    pub fn with_call_timeout(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            lease_ttl: call_timeout * 2,
            ..Default::default()
        }
    }
}

impl Default for DailyJobConfig {
    fn default() -> Self {
        Self {
            window: LookbackWindow::daily(),
            call_timeout: Duration::from_secs(3600),
            lease_ttl: Duration::from_secs(7200),
        }
    }
}

/// Errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("A run is already in progress for user {0}")]
    AlreadyRunning(UserId),
    #[error("Run {0} lost its lease to another run")]
    LeaseLost(Uuid),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Errors confined to one profile's isolation boundary
#[derive(Debug, thiserror::Error)]
enum ProfileError {
    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),
    #[error("Classification timed out after {0:?}")]
    ClassifyTimeout(Duration),
    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),
    #[error("Run lease lost")]
    LeaseLost,
}

#[derive(Debug, Default)]
struct ProfileStats {
    new_posts: usize,
    duplicates: usize,
    stale: usize,
}

/// Daily job orchestrator
pub struct DailyJob<S, C, St, Cl>
where
    S: PostSource + ?Sized,
    C: Classifier + ?Sized,
    St: Store + ?Sized,
    Cl: Clock + ?Sized,
{
    post_source: Arc<S>,
    classifier: Arc<C>,
    store: Arc<St>,
    clock: Arc<Cl>,
    dispatcher: NotificationDispatcher<St, Cl>,
    digest_builder: DigestBuilder,
    config: DailyJobConfig,
}

impl<S, C, St, Cl> DailyJob<S, C, St, Cl>
where
    S: PostSource + ?Sized,
    C: Classifier + ?Sized,
    St: Store + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        post_source: Arc<S>,
        classifier: Arc<C>,
        store: Arc<St>,
        clock: Arc<Cl>,
        dispatcher: NotificationDispatcher<St, Cl>,
        config: DailyJobConfig,
    ) -> Self {
        Self {
            post_source,
            classifier,
            store,
            clock,
            dispatcher,
            digest_builder: DigestBuilder::new(),
            config,
        }
    }

    /// Run the pipeline once for one user
    ///
    /// Fails fast with [`RunError::AlreadyRunning`] while another run holds
    /// the user's lease.
    pub async fn run_daily_job(&self, user_id: UserId) -> Result<RunReport, RunError> {
        let run = JobRun {
            id: Uuid::new_v4(),
            user_id,
            state: RunState::Running,
            started_at: self.clock.now(),
            finished_at: None,
            error: None,
        };

        if !self.acquire_lease(&run).await? {
            return Err(RunError::AlreadyRunning(user_id));
        }

        let result = match self.store.begin_run(&run).await {
            Ok(()) => {
                tracing::info!(user_id, run_id = %run.id, source = self.post_source.name(), "Starting daily job");
                let result = self.execute(&run).await;
                self.finish(&run, &result).await;
                result
            }
            Err(e) => Err(e.into()),
        };

        self.release_lease(&run).await;
        result
    }

    /// Run the pipeline for every user; a failing user does not stop the others
    pub async fn run_all_users_job(
        &self,
    ) -> Result<Vec<(User, Result<RunReport, RunError>)>, RunError> {
        let users = self.store.list_users().await?;
        tracing::info!(users = users.len(), "Running daily job for all users");

        let mut results = Vec::with_capacity(users.len());
        for user in users {
            let result = self.run_daily_job(user.id).await;
            match &result {
                Ok(report) => tracing::info!(
                    user_id = user.id,
                    username = %user.username,
                    new_posts = report.new_posts(),
                    failed_profiles = report.failed_profiles(),
                    "Daily job finished"
                ),
                Err(e) => tracing::error!(
                    user_id = user.id,
                    username = %user.username,
                    error = %e,
                    "Daily job failed"
                ),
            }
            results.push((user, result));
        }

        Ok(results)
    }

    /// Dispatch the digest of every run left `running` by a dead process
    ///
    /// The digest is rebuilt from the posts the run persisted. A run is only
    /// taken over once its lease has expired; runs still holding a live lease
    /// belong to a process that is alive and are left alone.
    pub async fn recover_interrupted_runs(&self) -> Result<Vec<RunReport>, RunError> {
        let runs = self.store.list_running_runs().await?;
        if runs.is_empty() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for run in runs {
            match self.acquire_lease(&run).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(run_id = %run.id, user_id = run.user_id, "Run lease is live, not recovering");
                    continue;
                }
                Err(e) => {
                    tracing::error!(run_id = %run.id, user_id = run.user_id, error = %e, "Failed to take run lease");
                    continue;
                }
            }

            tracing::warn!(run_id = %run.id, user_id = run.user_id, "Recovering interrupted run");
            let result = self.resume(&run).await;
            self.finish(&run, &result).await;
            self.release_lease(&run).await;

            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(run_id = %run.id, user_id = run.user_id, error = %e, "Recovery failed")
                }
            }
        }

        Ok(reports)
    }

    async fn execute(&self, run: &JobRun) -> Result<RunReport, RunError> {
        let profiles = self.store.list_profiles(run.user_id).await?;
        let monitored: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();

        let mut entries = Vec::new();
        let mut outcomes = Vec::with_capacity(profiles.len());

        for profile in &profiles {
            self.renew_lease(run).await?;
            let outcome = self.process_profile(profile, run, &mut entries).await;
            outcomes.push((profile.name.clone(), outcome));
        }
        self.renew_lease(run).await?;

        let digest = self.digest_builder.build(entries, &monitored);
        let settings = self.email_settings(run.user_id).await;
        let delivery = self
            .dispatcher
            .deliver(&digest, run.user_id, Some(run.id), &settings)
            .await?;

        Ok(RunReport {
            run_id: run.id,
            user_id: run.user_id,
            profiles: outcomes,
            digest,
            delivery,
        })
    }

    async fn resume(&self, run: &JobRun) -> Result<RunReport, RunError> {
        let posts = self.store.list_posts_for_run(run.id).await?;
        let profiles = self.store.list_profiles(run.user_id).await?;
        let names: HashMap<_, _> = profiles.iter().map(|p| (p.id, p.name.as_str())).collect();
        let monitored: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();

        let entries = posts
            .iter()
            .map(|post: &Post| {
                let name = names.get(&post.profile_id).copied().unwrap_or("Unknown");
                DigestEntry::from_post(name, post)
            })
            .collect();

        let digest = self.digest_builder.build(entries, &monitored);
        let settings = self.email_settings(run.user_id).await;
        let delivery = self
            .dispatcher
            .deliver(&digest, run.user_id, Some(run.id), &settings)
            .await?;

        tracing::info!(
            run_id = %run.id,
            user_id = run.user_id,
            entries = digest.entries.len(),
            "Recovered interrupted run"
        );

        Ok(RunReport {
            run_id: run.id,
            user_id: run.user_id,
            profiles: Vec::new(),
            digest,
            delivery,
        })
    }

    async fn finish(&self, run: &JobRun, result: &Result<RunReport, RunError>) {
        let (state, error) = match result {
            Ok(_) => (RunState::Completed, None),
            // The run now belongs to whoever took the lease
            Err(RunError::LeaseLost(_)) => return,
            Err(e) => (RunState::Failed, Some(e.to_string())),
        };

        if let Err(e) = self
            .store
            .finish_run(run.id, state, self.clock.now(), error.as_deref())
            .await
        {
            tracing::error!(run_id = %run.id, error = %e, "Failed to record run state");
        }
    }

    async fn acquire_lease(&self, run: &JobRun) -> Result<bool, StoreError> {
        let now = self.clock.now();
        self.store
            .acquire_run_lease(run.user_id, run.id, now, now + self.config.lease_ttl)
            .await
    }

    async fn renew_lease(&self, run: &JobRun) -> Result<(), RunError> {
        let expires_at = self.clock.now() + self.config.lease_ttl;
        if self
            .store
            .renew_run_lease(run.user_id, run.id, expires_at)
            .await?
        {
            Ok(())
        } else {
            tracing::error!(run_id = %run.id, user_id = run.user_id, "Run lease taken over, abandoning run");
            Err(RunError::LeaseLost(run.id))
        }
    }

    async fn release_lease(&self, run: &JobRun) {
        if let Err(e) = self.store.release_run_lease(run.user_id, run.id).await {
            tracing::warn!(run_id = %run.id, error = %e, "Failed to release run lease");
        }
    }

    async fn email_settings(&self, user_id: UserId) -> EmailSettings {
        match self.store.load_email_settings(user_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load email settings, email disabled");
                EmailSettings::default()
            }
        }
    }

    /// Isolation boundary for one profile
    async fn process_profile(
        &self,
        profile: &Profile,
        run: &JobRun,
        entries: &mut Vec<DigestEntry>,
    ) -> ProfileOutcome {
        if !profile.has_source() {
            tracing::info!(profile_id = profile.id, name = %profile.name, "No source URL, skipping");
            return ProfileOutcome::Skipped {
                reason: "No source URL".to_string(),
            };
        }

        let mut stats = ProfileStats::default();
        match self.ingest(profile, run, entries, &mut stats).await {
            Ok(()) => {
                tracing::info!(
                    profile_id = profile.id,
                    name = %profile.name,
                    new_posts = stats.new_posts,
                    duplicates = stats.duplicates,
                    stale = stats.stale,
                    "Processed profile"
                );
                ProfileOutcome::Processed {
                    new_posts: stats.new_posts,
                    duplicates: stats.duplicates,
                    stale: stats.stale,
                }
            }
            Err(e) => {
                tracing::error!(
                    profile_id = profile.id,
                    name = %profile.name,
                    new_posts = stats.new_posts,
                    error = %e,
                    "Failed to process profile"
                );
                ProfileOutcome::Failed {
                    new_posts: stats.new_posts,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn ingest(
        &self,
        profile: &Profile,
        run: &JobRun,
        entries: &mut Vec<DigestEntry>,
        stats: &mut ProfileStats,
    ) -> Result<(), ProfileError> {
        let timeout = self.config.call_timeout;

        let posts = tokio::time::timeout(timeout, self.post_source.fetch_recent_posts(profile))
            .await
            .map_err(|_| ProfileError::FetchTimeout(timeout))?;

        tracing::info!(profile_id = profile.id, name = %profile.name, fetched = posts.len(), "Fetched posts");

        let now = self.clock.now();
        let dedup = Deduplicator::new(self.store.as_ref());

        for raw in posts {
            if raw.text.trim().is_empty() {
                continue;
            }
            if !self.config.window.admits(raw.published_at, now) {
                stats.stale += 1;
                continue;
            }

            let fingerprint = compute_fingerprint(profile.id, &raw.text);
            if dedup
                .matches_existing(profile.id, raw.url(), &fingerprint)
                .await?
            {
                stats.duplicates += 1;
                continue;
            }

            match self.renew_lease(run).await {
                Ok(()) => {}
                Err(RunError::Store(e)) => return Err(e.into()),
                Err(_) => return Err(ProfileError::LeaseLost),
            }

            let classification =
                tokio::time::timeout(timeout, self.classifier.classify(&raw.text, &profile.name))
                    .await
                    .map_err(|_| ProfileError::ClassifyTimeout(timeout))??;

            let new_post = NewPost {
                profile_id: profile.id,
                url: raw.url().map(String::from),
                text: raw.text,
                fingerprint,
                published_at: raw.published_at,
                classification,
                run_id: Some(run.id),
                created_at: self.clock.now(),
            };

            match self.store.insert_post(&new_post).await? {
                InsertOutcome::Inserted(post) => {
                    tracing::debug!(
                        profile_id = profile.id,
                        post_id = post.id,
                        category = %post.classification.category,
                        "Stored post"
                    );
                    entries.push(DigestEntry::from_post(&profile.name, &post));
                    stats.new_posts += 1;
                }
                InsertOutcome::AlreadyStored => {
                    stats.duplicates += 1;
                }
            }
        }

        Ok(())
    }
}
