//! OpenAI-compatible chat completions adapter

use async_trait::async_trait;
use profile_digest_domain::{Classification, Classifier, ClassifyError, looks_rate_limited};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmConfig, SYSTEM_PROMPT, build_classification_prompt, parse_classification_response};

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint
///
/// Issues exactly one request per call. Rate-limit handling lives in the
/// domain's `ResilientClassifier`.
pub struct OpenAiCompatClassifier {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl OpenAiCompatClassifier {
    pub fn new(api_key: SecretString, base_url: String, config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    async fn call_api(&self, prompt: &str) -> Result<String, ClassifyError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
            max_completion_tokens: Some(self.config.max_output_tokens),
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::RateLimited(format!("API returned {}: {}", status, body)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("API returned {}: {}", status, body);
            if looks_rate_limited(&body) {
                return Err(ClassifyError::RateLimited(message));
            }
            return Err(ClassifyError::Api(message));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Api(format!("Invalid response body: {}", e)))?;

        Ok(api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string()))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Classifier for OpenAiCompatClassifier {
    async fn classify(&self, text: &str, author: &str) -> Result<Classification, ClassifyError> {
        let prompt = build_classification_prompt(text, author);

        let content = self.call_api(&prompt).await.map_err(|e| {
            tracing::error!(author = %author, error = %e, "AI API error classifying post");
            e
        })?;

        Ok(parse_classification_response(&content))
    }
}
