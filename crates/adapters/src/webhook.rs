//! Chat webhook delivery channel (Slack incoming webhooks)

use async_trait::async_trait;
use profile_digest_domain::{ChannelError, Digest, DigestChannel, EmailSettings, SendStatus};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// Posts a block-formatted digest to an incoming webhook URL
pub struct WebhookChannel {
    client: Client,
    url: Option<String>,
}

impl WebhookChannel {
    /// Channel is skipped when `url` is `None` or empty
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

fn section(text: String) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text },
    })
}

/// Render the block payload for a digest
pub fn build_payload(digest: &Digest) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "\u{1f4c5} Daily Relationship Update" },
        }),
        json!({ "type": "divider" }),
    ];

    if digest.entries.is_empty() {
        let names = if digest.monitored_profiles.is_empty() {
            "your tracked profiles".to_string()
        } else {
            digest.monitored_profiles.join(", ")
        };
        blocks.push(section(format!(
            "No new posts were found from {}. We'll check again tomorrow!",
            names
        )));
    }

    for entry in &digest.entries {
        blocks.push(section(format!(
            "*Name:* {}\n*Category:* {}\n*Summary:* {}\n*Suggested Reply:* {}\n*Post Link:* {}",
            entry.profile_name,
            entry.category,
            entry.summary,
            entry.suggested_reply,
            entry.post_url.as_deref().unwrap_or("N/A"),
        )));
        blocks.push(json!({ "type": "divider" }));
    }

    json!({ "blocks": blocks })
}

#[async_trait]
impl DigestChannel for WebhookChannel {
    async fn send(
        &self,
        digest: &Digest,
        _settings: &EmailSettings,
    ) -> Result<SendStatus, ChannelError> {
        let Some(url) = &self.url else {
            tracing::debug!("Webhook URL not configured");
            return Ok(SendStatus::Skipped("webhook URL not configured".to_string()));
        };

        let response = self
            .client
            .post(url)
            .json(&build_payload(digest))
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        tracing::info!(entries = digest.entries.len(), "Webhook digest sent");
        Ok(SendStatus::Sent)
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
