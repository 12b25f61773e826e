//! Paged scraping API adapter (RapidAPI-hosted LinkedIn scraper)

use async_trait::async_trait;
use profile_digest_domain::{Clock, PostSource, Profile, RawPost, policy::LookbackWindow};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{PostSourceError, extract_handle, http_client, retain_recent, timestamps};

/// Endpoint settings for [`ScraperApiSource`]
#[derive(Debug, Clone)]
pub struct ScraperApiConfig {
    pub base_url: String,
    /// Value sent as `x-rapidapi-host`
    pub host: String,
    /// Pause between the profile lookup and the posts request
    pub pause: Duration,
    pub timeout: Duration,
}

impl Default for ScraperApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fresh-linkedin-scraper-api.p.rapidapi.com".to_string(),
            host: "fresh-linkedin-scraper-api.p.rapidapi.com".to_string(),
            pause: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Post source that resolves a profile's URN, then reads page 1 of its posts
pub struct ScraperApiSource {
    client: Client,
    api_key: Option<SecretString>,
    config: ScraperApiConfig,
    clock: Arc<dyn Clock>,
    window: LookbackWindow,
}

impl ScraperApiSource {
    pub fn new(api_key: Option<SecretString>, config: ScraperApiConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: http_client(config.timeout),
            api_key,
            config: ScraperApiConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            clock,
            window: LookbackWindow::daily(),
        }
    }

    fn get(&self, path: &str, api_key: &SecretString) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.config.base_url, path))
            .header("x-rapidapi-key", api_key.expose_secret())
            .header("x-rapidapi-host", &self.config.host)
    }

    /// Look up the upstream URN for a handle; `None` when the profile is unknown
    async fn resolve_urn(
        &self,
        handle: &str,
        api_key: &SecretString,
    ) -> Result<Option<String>, PostSourceError> {
        let response = self
            .get("/api/v1/user/profile", api_key)
            .query(&[("username", handle)])
            .send()
            .await
            .map_err(PostSourceError::from_reqwest)?;

        check_status(&response)?;

        let body: ApiEnvelope<ProfileData> = response
            .json()
            .await
            .map_err(PostSourceError::from_reqwest)?;

        Ok(body
            .success
            .then_some(body.data)
            .flatten()
            .map(|d| d.urn)
            .filter(|urn| !urn.is_empty()))
    }

    async fn fetch_posts(
        &self,
        urn: &str,
        api_key: &SecretString,
    ) -> Result<Vec<RawPost>, PostSourceError> {
        let response = self
            .get("/api/v1/user/posts", api_key)
            .query(&[("urn", urn), ("page", "1")])
            .send()
            .await
            .map_err(PostSourceError::from_reqwest)?;

        check_status(&response)?;

        let body: ApiEnvelope<Value> = response
            .json()
            .await
            .map_err(PostSourceError::from_reqwest)?;

        if !body.success {
            return Err(PostSourceError::Unsuccessful(
                body.message.unwrap_or_default(),
            ));
        }

        let items = match body.data {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        Ok(items.iter().filter_map(map_item).collect())
    }

    async fn try_fetch(&self, profile: &Profile) -> Result<Vec<RawPost>, PostSourceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PostSourceError::MissingCredentials("scraper_api"))?;

        let Some(handle) = extract_handle(&profile.source_url) else {
            tracing::warn!(profile_id = profile.id, url = %profile.source_url, "Could not extract handle from URL");
            return Ok(Vec::new());
        };

        let Some(urn) = self.resolve_urn(&handle, api_key).await? else {
            tracing::warn!(profile_id = profile.id, handle = %handle, "No URN found for handle");
            return Ok(Vec::new());
        };
        tracing::debug!(handle = %handle, urn = %urn, "Resolved URN");

        tokio::time::sleep(self.config.pause).await;

        let posts = self.fetch_posts(&urn, api_key).await?;
        if posts.is_empty() {
            tracing::info!(profile_id = profile.id, handle = %handle, "No posts found");
        }
        Ok(posts)
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), PostSourceError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PostSourceError::RateLimited);
    }
    if !status.is_success() {
        return Err(PostSourceError::Api(format!("HTTP {}", status)));
    }
    Ok(())
}

/// Map one upstream post item; items without text are dropped
fn map_item(item: &Value) -> Option<RawPost> {
    let item = item.as_object()?;

    let text = item
        .get("text")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())?
        .to_string();

    let url = item.get("id").and_then(|id| match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let url = url.map(|id| format!("https://www.linkedin.com/feed/update/urn:li:activity:{}/", id));

    let published_at = item
        .get("created")
        .and_then(Value::as_object)
        .and_then(|created| {
            [created.get("date"), created.get("time")]
                .into_iter()
                .flatten()
                .find(|v| !is_blank(v))
        })
        .and_then(timestamps::parse_timestamp);

    Some(RawPost {
        text,
        url,
        published_at,
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct ProfileData {
    #[serde(default)]
    urn: String,
}

#[async_trait]
impl PostSource for ScraperApiSource {
    async fn fetch_recent_posts(&self, profile: &Profile) -> Vec<RawPost> {
        tracing::info!(profile_id = profile.id, name = %profile.name, "Fetching posts from scraper API");

        match self.try_fetch(profile).await {
            Ok(posts) => retain_recent(posts, self.window, self.clock.now(), profile),
            Err(PostSourceError::RateLimited) => {
                tracing::warn!(profile_id = profile.id, "Rate limited by scraper API, try again later");
                Vec::new()
            }
            Err(e @ PostSourceError::MissingCredentials(_)) => {
                tracing::warn!(error = %e, "Scraper API key not configured");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(profile_id = profile.id, error = %e, "Failed to fetch posts");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "scraper_api"
    }
}
