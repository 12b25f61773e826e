//! Classify command - one-shot classification

use anyhow::{Context, Result, bail};
use profile_digest_adapters::llm::{
    LlmConfig as AdapterLlmConfig, OpenAiCompatClassifier, StubClassifier,
};
use profile_digest_domain::Classifier;
use profile_digest_domain::usecases::{BackoffPolicy, ResilientClassifier};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::args::ClassifyArgs;
use crate::config::{AppConfig, RetryConfig};

pub async fn execute(args: ClassifyArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();

    if args.text.trim().is_empty() {
        bail!("No text provided for classification");
    }

    tracing::info!(
        provider = %config.llm.provider,
        text_length = args.text.len(),
        "Classifying text"
    );

    let classifier = build_classifier(&config)?;
    let classification = classifier
        .classify(&args.text, &args.author)
        .await
        .context("Classification failed")?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&classification).context("Failed to serialize output")?;
        println!("{}", json);
    } else {
        println!("Classification Results");
        println!("======================");
        println!();
        println!("Category: {}", classification.category);
        println!("Summary: {}", classification.summary);
        println!("Suggested Reply: {}", classification.suggested_reply);
    }

    Ok(())
}

/// Build the configured classifier wrapped in rate-limit retry
pub(crate) fn build_classifier(config: &AppConfig) -> Result<Arc<dyn Classifier>> {
    let inner: Arc<dyn Classifier> = match config.llm.provider.as_str() {
        "openai_compat" => {
            let base_url = config.llm.base_url.trim();
            if base_url.is_empty() {
                bail!("LLM base_url is required for provider openai_compat");
            }
            let api_key = load_api_key(&config.llm.api_key_env, "openai_compat")?;
            Arc::new(OpenAiCompatClassifier::new(
                api_key,
                base_url.to_string(),
                adapter_llm_config(&config.llm),
            ))
        }
        "stub" => Arc::new(StubClassifier::keywords()),
        other => bail!("Unknown LLM provider: {}", other),
    };

    Ok(Arc::new(ResilientClassifier::new(
        inner,
        backoff_policy(&config.llm.retry),
    )))
}

fn adapter_llm_config(config: &crate::config::LlmConfig) -> AdapterLlmConfig {
    AdapterLlmConfig {
        model: config.model.clone(),
        max_output_tokens: config.max_output_tokens,
        timeout_secs: config.timeout_secs,
    }
}

pub(crate) fn backoff_policy(retry: &RetryConfig) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts: retry.max_attempts.max(1),
        base_delay: Duration::from_secs(retry.base_delay_secs),
        min_delay: Duration::from_secs(retry.min_delay_secs),
        max_delay: Duration::from_secs(retry.max_delay_secs.max(retry.min_delay_secs)),
    }
}

pub(crate) fn load_api_key(env_var: &str, provider: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No API key env var configured for provider {}", provider);
    }

    let key = std::env::var(env_var).with_context(|| {
        format!(
            "Missing API key env var {} for provider {}",
            env_var, provider
        )
    })?;

    if key.trim().is_empty() {
        bail!(
            "API key env var {} is empty for provider {}",
            env_var,
            provider
        );
    }

    Ok(SecretString::new(key.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile_digest_domain::Category;

    #[tokio::test]
    async fn test_build_classifier_stub_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "stub".to_string();

        let classifier = build_classifier(&config).unwrap();
        let result = classifier
            .classify("We're hiring senior engineers", "Acme")
            .await
            .unwrap();

        assert_eq!(result.category, Category::Hiring);
    }

    #[test]
    fn test_build_classifier_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "telepathy".to_string();

        assert!(build_classifier(&config).is_err());
    }

    #[test]
    fn test_build_classifier_requires_api_key() {
        let mut config = AppConfig::default();
        config.llm.api_key_env = "PROFILE_DIGEST_TEST_UNSET_KEY".to_string();

        let err = build_classifier(&config).err().unwrap();
        assert!(err.to_string().contains("PROFILE_DIGEST_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_backoff_policy_from_config() {
        let policy = backoff_policy(&RetryConfig::default());
        assert_eq!(policy, BackoffPolicy::rate_limited());
    }
}
