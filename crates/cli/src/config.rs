//! Configuration loading and management

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline applied to each fetch and each classification of a run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Six-field cron expression (sec min hour day month weekday), UTC
    #[serde(default = "default_cron")]
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_provider")]
    pub provider: String,

    #[serde(default)]
    pub scraper_api: ScraperApiSettings,

    #[serde(default)]
    pub automation_job: AutomationJobSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperApiSettings {
    #[serde(default = "default_rapidapi_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_scraper_base_url")]
    pub base_url: String,

    #[serde(default = "default_scraper_host")]
    pub host: String,

    /// Pause between the profile lookup and the posts request
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationJobSettings {
    #[serde(default = "default_phantombuster_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_automation_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url_env")]
    pub url_env: String,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("./profile-digest.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_run_timeout() -> u64 {
    3600
}

fn default_cron() -> String {
    "0 0 8 * * *".to_string()
}

fn default_source_provider() -> String {
    "scraper_api".to_string()
}

fn default_rapidapi_key_env() -> String {
    "RAPIDAPI_KEY".to_string()
}

fn default_scraper_base_url() -> String {
    "https://fresh-linkedin-scraper-api.p.rapidapi.com".to_string()
}

fn default_scraper_host() -> String {
    "fresh-linkedin-scraper-api.p.rapidapi.com".to_string()
}

fn default_pause_ms() -> u64 {
    1000
}

fn default_phantombuster_key_env() -> String {
    "PHANTOMBUSTER_API_KEY".to_string()
}

fn default_automation_base_url() -> String {
    "https://api.phantombuster.com/api/v2".to_string()
}

fn default_llm_provider() -> String {
    "openai_compat".to_string()
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_api_key_env() -> String {
    "AI_INTEGRATIONS_OPENAI_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_output_tokens() -> u32 {
    512
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    1
}

fn default_min_delay() -> u64 {
    2
}

fn default_max_delay() -> u64 {
    60
}

fn default_webhook_url_env() -> String {
    "SLACK_WEBHOOK_URL".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_log_level(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: default_source_provider(),
            scraper_api: ScraperApiSettings::default(),
            automation_job: AutomationJobSettings::default(),
        }
    }
}

impl Default for ScraperApiSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_rapidapi_key_env(),
            base_url: default_scraper_base_url(),
            host: default_scraper_host(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl Default for AutomationJobSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_phantombuster_key_env(),
            base_url: default_automation_base_url(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_llm_api_key_env(),
            timeout_secs: default_llm_timeout(),
            max_output_tokens: default_max_output_tokens(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url_env: default_webhook_url_env(),
        }
    }
}

/// Read a secret from the named environment variable, ignoring empty values
pub fn load_secret(env_var: &str) -> Option<SecretString> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::new(v.into()))
}

/// Read a plain value from the named environment variable, ignoring empty values
pub fn load_env(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Environment overrides, e.g. PROFILE_DIGEST__GENERAL__DATABASE_PATH
        builder = builder.add_source(
            config::Environment::with_prefix("PROFILE_DIGEST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# profile-digest configuration

[general]
database_path = "./profile-digest.sqlite"
log_level = "info"
# Deadline for each fetch and each classification
run_timeout_secs = 3600

[schedule]
# sec min hour day month weekday (UTC)
cron = "0 0 8 * * *"

[source]
provider = "scraper_api"  # scraper_api, automation_job, stub

[source.scraper_api]
api_key_env = "RAPIDAPI_KEY"
base_url = "https://fresh-linkedin-scraper-api.p.rapidapi.com"
host = "fresh-linkedin-scraper-api.p.rapidapi.com"
pause_ms = 1000

[source.automation_job]
api_key_env = "PHANTOMBUSTER_API_KEY"
base_url = "https://api.phantombuster.com/api/v2"

[llm]
provider = "openai_compat"  # openai_compat, stub
model = "gpt-5-mini"
base_url = "https://api.openai.com/v1"
api_key_env = "AI_INTEGRATIONS_OPENAI_API_KEY"
timeout_secs = 60
max_output_tokens = 512

[llm.retry]
max_attempts = 5
base_delay_secs = 1
min_delay_secs = 2
max_delay_secs = 60

[webhook]
url_env = "SLACK_WEBHOOK_URL"
"#
        .to_string()
    }
}
