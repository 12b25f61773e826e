//! Doctor command - validate configuration and show status

use anyhow::{Result, bail};
use profile_digest_adapters::store::SqliteStore;
use profile_digest_domain::Store;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::args::DoctorArgs;
use crate::config::AppConfig;

const COMPONENTS: [&str; 5] = ["config", "database", "source", "llm", "webhook"];

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    database: CheckResult,
    source: CheckResult,
    llm: CheckResult,
    webhook: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

impl DoctorReport {
    fn get(&self, component: &str) -> &CheckResult {
        match component {
            "database" => &self.database,
            "source" => &self.source,
            "llm" => &self.llm,
            "webhook" => &self.webhook,
            _ => &self.config,
        }
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    if let Some(check) = args.check.as_deref() {
        if !COMPONENTS.contains(&check) {
            bail!(
                "Unknown component {} (expected one of: {})",
                check,
                COMPONENTS.join(", ")
            );
        }
    }

    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        database: CheckResult::error("Not checked"),
        source: CheckResult::error("Not checked"),
        llm: CheckResult::error("Not checked"),
        webhook: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    // Check config
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.database = check_database(&config.general.database_path).await;
        report.source = check_source(config);
        report.llm = check_llm(config);
        report.webhook = check_webhook(config);
    }

    let checks: Vec<&CheckResult> = match args.check.as_deref() {
        Some(component) => vec![report.get(component)],
        None => vec![&report.config, &report.database, &report.source, &report.llm],
    };

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    // Output report
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, args.check.as_deref());
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_database(path: &Path) -> CheckResult {
    let store = match SqliteStore::new(path).await {
        Ok(store) => store,
        Err(e) => {
            return CheckResult::error(format!(
                "Failed to open database {}: {}",
                path.display(),
                e
            ));
        }
    };

    match store.list_users().await {
        Ok(users) => CheckResult::ok(format!("{} ({} users)", path.display(), users.len()))
            .with_details(serde_json::json!({
                "users": users.iter().map(|u| &u.username).collect::<Vec<_>>()
            })),
        Err(e) => CheckResult::error(format!("Database query failed: {}", e)),
    }
}

fn env_status(env_var: &str) -> &'static str {
    match std::env::var(env_var) {
        Ok(val) if !val.trim().is_empty() => "set",
        _ => "not set",
    }
}

fn check_source(config: &AppConfig) -> CheckResult {
    let env_var = match config.source.provider.as_str() {
        "scraper_api" => &config.source.scraper_api.api_key_env,
        "automation_job" => &config.source.automation_job.api_key_env,
        "stub" => return CheckResult::ok("Provider: stub (offline)"),
        other => return CheckResult::error(format!("Unknown post source provider: {}", other)),
    };

    if env_var.is_empty() {
        return CheckResult::error(format!(
            "No API key env var configured for {}",
            config.source.provider
        ));
    }

    let message = format!(
        "Provider: {}, API key: {} ({})",
        config.source.provider,
        env_var,
        env_status(env_var)
    );
    if env_status(env_var) == "set" {
        CheckResult::ok(message)
    } else {
        CheckResult::warn(message)
    }
}

fn check_llm(config: &AppConfig) -> CheckResult {
    let provider = &config.llm.provider;
    let model = &config.llm.model;

    match provider.as_str() {
        "stub" => return CheckResult::ok("Provider: stub (offline)"),
        "openai_compat" => {}
        other => return CheckResult::error(format!("Unknown LLM provider: {}", other)),
    }

    if config.llm.base_url.trim().is_empty() {
        return CheckResult::error("LLM base_url is empty");
    }

    let api_key_env = &config.llm.api_key_env;
    if api_key_env.is_empty() {
        return CheckResult::error(format!("No API key env var configured for {}", provider));
    }

    let message = format!(
        "Provider: {}, Model: {}, API key: {} ({})",
        provider,
        model,
        api_key_env,
        env_status(api_key_env)
    );
    if env_status(api_key_env) == "set" {
        CheckResult::ok(message).with_details(serde_json::json!({
            "base_url": config.llm.base_url,
            "max_attempts": config.llm.retry.max_attempts,
        }))
    } else {
        CheckResult::warn(message)
    }
}

fn check_webhook(config: &AppConfig) -> CheckResult {
    let env_var = &config.webhook.url_env;
    match env_status(env_var) {
        "set" => CheckResult::ok(format!("Webhook URL: {} (set)", env_var)),
        _ => CheckResult::ok(format!("Webhook disabled ({} not set)", env_var)),
    }
}

fn print_report(report: &DoctorReport, only: Option<&str>) {
    println!("profile-digest Doctor Report");
    println!("============================");
    println!();

    let rows = [
        ("config", "Config"),
        ("database", "Database"),
        ("source", "Post Source"),
        ("llm", "LLM Provider"),
        ("webhook", "Webhook"),
    ];
    for (component, label) in rows {
        if only.is_none_or(|c| c == component) {
            print_check(label, report.get(component));
        }
    }

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" && only.is_none() {
        println!();
        println!("Ready to run! Try: profile-digest run --user <name>");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
