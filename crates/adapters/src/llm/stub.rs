//! Stub classifier for testing and offline mode

use async_trait::async_trait;
use profile_digest_domain::{Category, Classification, Classifier, ClassifyError};

/// Stub classifier that returns configurable responses
pub struct StubClassifier {
    response: Option<Classification>,
    error: Option<String>,
}

impl StubClassifier {
    /// Create a stub that guesses the category from keywords in the post
    pub fn keywords() -> Self {
        Self {
            response: None,
            error: None,
        }
    }

    /// Create a stub that returns a specific response
    pub fn with_response(response: Classification) -> Self {
        Self {
            response: Some(response),
            error: None,
        }
    }

    /// Create a stub that always fails with an API error
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            response: None,
            error: Some(message.into()),
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::keywords()
    }
}

const KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Funding,
        &["raised", "funding", "seed", "series a", "series b", "investors"],
    ),
    (
        Category::Hiring,
        &["hiring", "join our team", "open role", "we're looking for"],
    ),
    (
        Category::Launch,
        &["launch", "introducing", "announcing", "now available"],
    ),
];

fn guess_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, text: &str, author: &str) -> Result<Classification, ClassifyError> {
        if let Some(ref message) = self.error {
            return Err(ClassifyError::Api(message.clone()));
        }

        if let Some(ref response) = self.response {
            return Ok(response.clone());
        }

        let category = guess_category(text);
        let first_line = text.lines().next().unwrap_or_default();
        let summary: String = first_line.chars().take(120).collect();

        Ok(Classification {
            summary: format!("{} posted: {}", author, summary),
            category,
            suggested_reply: Classification::DEFAULT_REPLY.to_string(),
        })
    }
}
