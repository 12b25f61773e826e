//! Automation job output adapter (PhantomBuster agents)
//!
//! Reads the latest output of a pre-provisioned job. Launching and polling
//! jobs is left to the automation platform's own schedule.

use async_trait::async_trait;
use profile_digest_domain::{Clock, PostSource, Profile, RawPost, policy::LookbackWindow};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{PostSourceError, http_client, retain_recent, timestamps};

const TEXT_FIELDS: [&str; 3] = ["postContent", "text", "description"];
const URL_FIELDS: [&str; 2] = ["postUrl", "url"];
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "date", "publishedDate"];

#[derive(Debug, Clone)]
pub struct AutomationJobConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AutomationJobConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.phantombuster.com/api/v2".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Post source reading the result object of a profile's automation job
pub struct AutomationJobSource {
    client: Client,
    api_key: Option<SecretString>,
    base_url: String,
    clock: Arc<dyn Clock>,
    window: LookbackWindow,
}

impl AutomationJobSource {
    pub fn new(
        api_key: Option<SecretString>,
        config: AutomationJobConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client: http_client(config.timeout),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            clock,
            window: LookbackWindow::daily(),
        }
    }

    async fn fetch_output(&self, job_id: &str) -> Result<Vec<RawPost>, PostSourceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PostSourceError::MissingCredentials("automation_job"))?;

        let response = self
            .client
            .get(format!("{}/agents/fetch-output", self.base_url))
            .query(&[("id", job_id)])
            .header("X-Phantombuster-Key", api_key.expose_secret())
            .send()
            .await
            .map_err(PostSourceError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PostSourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(PostSourceError::Api(format!("HTTP {}", status)));
        }

        let output: JobOutput = response
            .json()
            .await
            .map_err(PostSourceError::from_reqwest)?;

        let items = result_items(output.result_object)?;
        Ok(items.iter().filter_map(map_item).collect())
    }
}

#[derive(Deserialize)]
struct JobOutput {
    #[serde(rename = "resultObject", default)]
    result_object: Value,
}

/// Normalize the three shapes a result object comes in
fn result_items(result: Value) -> Result<Vec<Value>, PostSourceError> {
    match result {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(single @ Value::Object(_)) => Ok(vec![single]),
            Ok(_) => Ok(Vec::new()),
            Err(e) => Err(PostSourceError::Decode(format!(
                "resultObject is not valid JSON: {}",
                e
            ))),
        },
        single => Ok(vec![single]),
    }
}

fn first_string(item: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| item.get(*f).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(String::from)
}

fn map_item(item: &Value) -> Option<RawPost> {
    let item = item.as_object()?;
    let text = first_string(item, &TEXT_FIELDS)?;
    let url = first_string(item, &URL_FIELDS);
    let published_at = TIMESTAMP_FIELDS
        .iter()
        .filter_map(|f| item.get(*f))
        .find_map(timestamps::parse_timestamp);

    Some(RawPost {
        text,
        url,
        published_at,
    })
}

#[async_trait]
impl PostSource for AutomationJobSource {
    async fn fetch_recent_posts(&self, profile: &Profile) -> Vec<RawPost> {
        let Some(job_id) = profile.automation_job_id.as_deref().filter(|id| !id.is_empty()) else {
            tracing::debug!(profile_id = profile.id, "No automation job configured");
            return Vec::new();
        };

        tracing::info!(profile_id = profile.id, job_id = %job_id, "Fetching automation job output");

        match self.fetch_output(job_id).await {
            Ok(posts) => {
                let recent = retain_recent(posts, self.window, self.clock.now(), profile);
                tracing::info!(job_id = %job_id, count = recent.len(), "Found recent posts");
                recent
            }
            Err(e @ PostSourceError::MissingCredentials(_)) => {
                tracing::warn!(error = %e, "Automation API key not configured");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(profile_id = profile.id, job_id = %job_id, error = %e, "Failed to fetch job output");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "automation_job"
    }
}
