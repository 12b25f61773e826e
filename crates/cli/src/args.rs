//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// profile-digest: daily AI-classified digests of tracked social profiles
#[derive(Parser, Debug)]
#[command(name = "profile-digest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daily job now for one user or for everyone
    Run(RunArgs),

    /// Recover interrupted runs, then run the daily job on a schedule
    Serve(ServeArgs),

    /// One-shot classification of a post
    Classify(ClassifyArgs),

    /// Manage tracked profiles
    Profiles(ProfilesArgs),

    /// Read and acknowledge digest notifications
    Notifications(NotificationsArgs),

    /// Per-user settings (email delivery)
    Settings(SettingsArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// User to run the job for
    #[arg(long, required_unless_present = "all", conflicts_with = "all")]
    pub user: Option<String>,

    /// Run the job for every user
    #[arg(long)]
    pub all: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the cron expression from the configuration
    #[arg(long)]
    pub cron: Option<String>,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Post text to classify
    #[arg(long)]
    pub text: String,

    /// Author shown to the model
    #[arg(long, default_value = "Unknown")]
    pub author: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: ProfilesCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProfilesCommands {
    /// Track a new profile (creates the user if needed)
    Add {
        #[arg(long)]
        user: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Public profile URL
        #[arg(long)]
        url: String,

        /// person or company
        #[arg(long, default_value = "person")]
        kind: String,

        /// Automation job holding this profile's posts
        #[arg(long)]
        automation_job: Option<String>,
    },

    /// List tracked profiles
    List {
        #[arg(long)]
        user: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop tracking a profile and delete its posts
    Remove {
        #[arg(long)]
        user: String,

        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub command: NotificationsCommands,
}

#[derive(Subcommand, Debug)]
pub enum NotificationsCommands {
    /// List notifications, newest first
    List {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark one or all notifications as read
    Read {
        #[arg(long)]
        user: String,

        #[arg(long, required_unless_present = "all", conflicts_with = "all")]
        id: Option<i64>,

        #[arg(long)]
        all: bool,
    },
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Store a setting (notify_email, smtp_host, smtp_port, smtp_user, smtp_password)
    Set {
        #[arg(long)]
        user: String,

        #[arg(long)]
        key: String,

        #[arg(long)]
        value: String,
    },

    /// Show the effective email configuration
    Email {
        #[arg(long)]
        user: String,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Check specific component (config, database, source, llm, webhook)
    #[arg(long)]
    pub check: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
