//! Post source adapters

mod automation_job;
mod scraper_api;
pub mod timestamps;

pub use automation_job::{AutomationJobConfig, AutomationJobSource};
pub use scraper_api::{ScraperApiConfig, ScraperApiSource};

use async_trait::async_trait;
use profile_digest_domain::{Clock, PostSource, Profile, RawPost, policy::LookbackWindow};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use time::OffsetDateTime;

/// Failures inside a post source; never crosses the port boundary
#[derive(Debug, thiserror::Error)]
pub(crate) enum PostSourceError {
    #[error("Missing API key ({0})")]
    MissingCredentials(&'static str),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited by upstream")]
    RateLimited,
    #[error("Upstream error: {0}")]
    Api(String),
    #[error("Unsuccessful response: {0}")]
    Unsuccessful(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl PostSourceError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PostSourceError::Decode(e.to_string())
        } else {
            PostSourceError::Network(e.to_string())
        }
    }
}

static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"linkedin\.com/(?:in|company)/([^/?#]+)").expect("valid handle regex")
});

/// Extract the profile handle from a `linkedin.com/in/<h>` or
/// `linkedin.com/company/<h>` URL
pub fn extract_handle(url: &str) -> Option<String> {
    HANDLE_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('/').to_string())
        .filter(|h| !h.is_empty())
}

/// Apply the lookback window, logging how many posts were dropped
pub(crate) fn retain_recent(
    posts: Vec<RawPost>,
    window: LookbackWindow,
    now: OffsetDateTime,
    profile: &Profile,
) -> Vec<RawPost> {
    let total = posts.len();
    let recent: Vec<RawPost> = posts
        .into_iter()
        .filter(|p| window.admits(p.published_at, now))
        .collect();
    if recent.len() < total {
        tracing::debug!(
            profile_id = profile.id,
            dropped = total - recent.len(),
            "Dropped posts outside the lookback window"
        );
    }
    recent
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}

/// Stub post source for testing and offline runs
///
/// Returns one freshly timestamped sample post per profile.
pub struct StubPostSource {
    clock: Arc<dyn Clock>,
}

impl StubPostSource {
    pub fn sample(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl PostSource for StubPostSource {
    async fn fetch_recent_posts(&self, profile: &Profile) -> Vec<RawPost> {
        let now = self.clock.now();
        let posts = vec![RawPost {
            text: format!(
                "{} is hiring! We're looking for engineers to join our team.",
                profile.name
            ),
            url: None,
            published_at: Some(now),
        }];
        retain_recent(posts, LookbackWindow::daily(), now, profile)
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
