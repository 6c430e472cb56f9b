//! Command-line interface definitions for the news poster.
//!
//! Secrets are normally supplied through the environment (optionally via a
//! `.env` file); every one of them can also be given as a flag.

use clap::Parser;

/// Command-line arguments for a single posting run.
///
/// # Examples
///
/// ```sh
/// # Scheduled run, ledger in S3, settings from config.yaml
/// news_poster --config config.yaml --bucket-name my-bucket
///
/// # Manual run: up to 10 items, local ledger, raw snippets
/// news_poster --manual
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Run the manual variant: fixed cap of 10 items, local ledger, raw snippets
    #[arg(long)]
    pub manual: bool,

    /// Override the item cap for this run
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Directory for staged images (defaults to the system temp dir)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// News feed API token
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Instagram account name
    #[arg(long, env = "INSTAGRAM_USERNAME")]
    pub instagram_username: Option<String>,

    /// Instagram account password
    #[arg(long, env = "INSTAGRAM_PASSWORD", hide_env_values = true)]
    pub instagram_password: Option<String>,

    /// Mailbox that receives the security codes
    #[arg(long, env = "EMAIL_USER")]
    pub email_user: Option<String>,

    /// Mailbox password (an app password for Gmail)
    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    pub email_password: Option<String>,

    /// Keep the posted-items ledger in this S3 bucket instead of a local file
    #[arg(long, env = "BUCKET_NAME")]
    pub bucket_name: Option<String>,
}
