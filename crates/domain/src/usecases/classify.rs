//! Classification use case: rate-limit resilience around a classifier

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    model::Classification,
    ports::{Classifier, ClassifyError},
    usecases::retry::{BackoffPolicy, retry_with_backoff},
};

/// Classifier decorator that retries rate-limited calls with exponential back-off
///
/// Other errors propagate on the first failure. After `max_attempts`
/// rate-limited failures the last error is returned.
pub struct ResilientClassifier {
    inner: Arc<dyn Classifier>,
    policy: BackoffPolicy,
}

impl ResilientClassifier {
    pub fn new(inner: Arc<dyn Classifier>, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Classifier for ResilientClassifier {
    async fn classify(&self, text: &str, author: &str) -> Result<Classification, ClassifyError> {
        let result = retry_with_backoff(self.policy, ClassifyError::is_rate_limited, || {
            self.inner.classify(text, author)
        })
        .await;

        if let Err(ref e) = result {
            if e.is_rate_limited() {
                tracing::error!(
                    author = %author,
                    attempts = self.policy.max_attempts,
                    error = %e,
                    "Classification retry budget exhausted"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error for the first `failures` calls
    struct FlakyClassifier {
        failures: u32,
        rate_limited: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Classifier for FlakyClassifier {
        async fn classify(
            &self,
            _text: &str,
            _author: &str,
        ) -> Result<Classification, ClassifyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                if self.rate_limited {
                    Err(ClassifyError::Api("API returned 429: Too Many Requests".to_string()))
                } else {
                    Err(ClassifyError::Api("API returned 500: boom".to_string()))
                }
            } else {
                Ok(Classification {
                    summary: "Raised a round".to_string(),
                    category: Category::Funding,
                    suggested_reply: "Congrats!".to_string(),
                })
            }
        }
    }

    fn flaky(failures: u32, rate_limited: bool) -> Arc<FlakyClassifier> {
        Arc::new(FlakyClassifier {
            failures,
            rate_limited,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_fifth_attempt() {
        let inner = flaky(4, true);
        let classifier = ResilientClassifier::new(inner.clone(), BackoffPolicy::rate_limited());

        let result = classifier.classify("We raised $10M", "Acme").await.unwrap();

        assert_eq!(result.category, Category::Funding);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_propagates() {
        let inner = flaky(5, true);
        let classifier = ResilientClassifier::new(inner.clone(), BackoffPolicy::rate_limited());

        let err = classifier.classify("text", "Acme").await.unwrap_err();

        assert!(err.is_rate_limited());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let inner = flaky(1, false);
        let classifier = ResilientClassifier::new(inner.clone(), BackoffPolicy::rate_limited());

        let err = classifier.classify("text", "Acme").await.unwrap_err();

        assert!(!err.is_rate_limited());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
