//! LLM provider adapters

pub mod openai_compat;
pub mod stub;

pub use openai_compat::OpenAiCompatClassifier;
pub use stub::StubClassifier;

use profile_digest_domain::{Category, Classification};
use serde::{Deserialize, Serialize};

/// Common LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini".to_string(),
            max_output_tokens: 512,
            timeout_secs: 60,
        }
    }
}

pub const SYSTEM_PROMPT: &str =
    "You are a LinkedIn relationship intelligence assistant. Always respond with valid JSON.";

/// Build the classification prompt for a post
pub fn build_classification_prompt(post_text: &str, author: &str) -> String {
    format!(
        r#"Analyze the following LinkedIn post by {author}.

Post: {post_text}

Respond in JSON with these fields:
- "summary": A single-sentence summary of the post.
- "category": Classify as one of: "Funding", "Hiring", "Launch", "Other".
- "suggested_reply": A short, professional congratulatory reply (1-2 sentences).

Return only valid JSON, no markdown."#
    )
}

/// Shape of the model's JSON answer; every field is optional
#[derive(Debug, Default, Deserialize)]
struct RawClassification {
    #[serde(default)]
    summary: Option<serde_json::Value>,
    #[serde(default)]
    category: Option<serde_json::Value>,
    #[serde(default)]
    suggested_reply: Option<serde_json::Value>,
}

/// Parse the model's answer into a fully populated classification
///
/// Missing fields take their defaults and unknown categories map to `Other`.
/// Content that is not a JSON object yields [`Classification::fallback`].
pub fn parse_classification_response(response: &str) -> Classification {
    let json_str = extract_json(response);

    let raw: RawClassification = match serde_json::from_str::<serde_json::Value>(json_str) {
        Ok(value @ serde_json::Value::Object(_)) => match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected classification shape, using fallback");
                return Classification::fallback();
            }
        },
        Ok(_) => {
            tracing::warn!("Classification response is not a JSON object, using fallback");
            return Classification::fallback();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse classification response, using fallback");
            return Classification::fallback();
        }
    };

    Classification {
        summary: text_field(raw.summary)
            .unwrap_or_else(|| Classification::DEFAULT_SUMMARY.to_string()),
        category: text_field(raw.category)
            .map(|label| Category::from_label(&label))
            .unwrap_or_default(),
        suggested_reply: text_field(raw.suggested_reply)
            .unwrap_or_else(|| Classification::DEFAULT_REPLY.to_string()),
    }
}

fn text_field(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Extract JSON from response (handles markdown code blocks)
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // Check for ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return trimmed[start + 7..start + 7 + end].trim();
        }
    }

    // Check for ``` ... ``` blocks
    if let Some(start) = trimmed.find("```") {
        if let Some(end) = trimmed[start + 3..].find("```") {
            let content = trimmed[start + 3..start + 3 + end].trim();
            // Skip language identifier if present
            if let Some(newline) = content.find('\n') {
                let first_line = &content[..newline];
                if !first_line.starts_with('{') {
                    return content[newline + 1..].trim();
                }
            }
            return content;
        }
    }

    // Assume raw JSON
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_code_block() {
        let input = "```json\n{\"summary\": \"x\"}\n```";
        assert_eq!(extract_json(input), r#"{"summary": "x"}"#);
    }

    #[test]
    fn test_parse_valid_response() {
        let json = r#"{
            "summary": "Acme closed a $10M Series A.",
            "category": "Funding",
            "suggested_reply": "Congrats on the raise!"
        }"#;

        let result = parse_classification_response(json);
        assert_eq!(result.category, Category::Funding);
        assert_eq!(result.summary, "Acme closed a $10M Series A.");
        assert_eq!(result.suggested_reply, "Congrats on the raise!");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let result = parse_classification_response(r#"{"category": "hiring"}"#);
        assert_eq!(result.category, Category::Hiring);
        assert_eq!(result.summary, "No summary available.");
        assert_eq!(result.suggested_reply, "Congratulations on the update!");
    }

    #[test]
    fn test_unknown_category_maps_to_other() {
        let result = parse_classification_response(r#"{"category": "Partnership"}"#);
        assert_eq!(result.category, Category::Other);
    }

    #[test]
    fn test_malformed_output_falls_back() {
        let result = parse_classification_response("Sure! Here is my analysis: funding.");
        assert_eq!(result, Classification::fallback());
        assert_eq!(result.summary, "Could not generate summary.");

        assert_eq!(parse_classification_response("[1, 2]"), Classification::fallback());
    }

    #[test]
    fn test_prompt_embeds_author_and_text() {
        let prompt = build_classification_prompt("We raised $10M", "Acme");
        assert!(prompt.contains("LinkedIn post by Acme"));
        assert!(prompt.contains("Post: We raised $10M"));
    }
}
