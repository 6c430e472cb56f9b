//! Runtime configuration.
//!
//! Everything a run needs is collected into one [`Config`] that is built once
//! in `main` and handed to each component at construction. The YAML file is
//! optional; every section has defaults matching the scheduled deployment, and
//! secrets are layered on top from the command line / environment (see
//! [`crate::cli::Cli`]).
//!
//! ```yaml
//! feed:
//!   endpoint: https://api.thenewsapi.com/v1/news/top
//!   locale: us
//! ledger:
//!   backend: file
//!   path: posted_uuids.txt
//! cap:
//!   policy: random
//!   min: 1
//!   max: 3
//! schedule:
//!   rule_name: random-poster
//!   trigger:
//!     backend: file
//!     path: schedule.json
//! ```

use crate::cli::Cli;
use crate::error::ConfigError;
use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const BASE_HASHTAGS: [&str; 15] = [
    "#BreakingNews",
    "#NewsUpdate",
    "#WorldNews",
    "#LatestNews",
    "#TopStories",
    "#GlobalNews",
    "#DailyNews",
    "#NewsAlert",
    "#CurrentEvents",
    "#NewsToday",
    "#Headlines",
    "#TrendingNews",
    "#NewsBreak",
    "#InTheNews",
    "#NewsFeed",
];

/// Ledger object key, also used as the local file name.
pub const LEDGER_KEY: &str = "posted_uuids.txt";

/// Fixed item cap of the manually-run variant.
pub const MANUAL_MAX_ITEMS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub mailbox: MailboxConfig,
    pub platform: PlatformConfig,
    pub ledger: LedgerConfig,
    pub hashtags: Vec<String>,
    pub cap: CapPolicy,
    pub snippet: SnippetConfig,
    pub schedule: ScheduleConfig,
    /// Directory for staged images; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            mailbox: MailboxConfig::default(),
            platform: PlatformConfig::default(),
            ledger: LedgerConfig::default(),
            hashtags: BASE_HASHTAGS.iter().map(|t| t.to_string()).collect(),
            cap: CapPolicy::default(),
            snippet: SnippetConfig::default(),
            schedule: ScheduleConfig::default(),
            staging_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoint: String,
    pub api_token: String,
    pub locale: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.thenewsapi.com/v1/news/top".to_string(),
            api_token: String::new(),
            locale: "us".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address of the platform's security notifications.
    pub sender: String,
    /// Socket read/write timeout, and the bound on one whole session.
    pub timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            username: String::new(),
            password: String::new(),
            sender: "security@mail.instagram.com".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub username: String,
    pub password: String,
    /// Only escalate to the mailbox when the platform explicitly asks for a
    /// second factor. Off by default: any failed login escalates.
    pub strict_second_factor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum LedgerConfig {
    File { path: PathBuf },
    S3 { bucket: String, key: String },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig::File {
            path: PathBuf::from(LEDGER_KEY),
        }
    }
}

/// How many feed items a run may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum CapPolicy {
    /// Uniform in `min..=max`, drawn once per run.
    Random { min: usize, max: usize },
    Fixed { count: usize },
}

impl Default for CapPolicy {
    fn default() -> Self {
        CapPolicy::Random { min: 1, max: 3 }
    }
}

impl CapPolicy {
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match *self {
            CapPolicy::Random { min, max } if min < max => rng.random_range(min..=max),
            CapPolicy::Random { min, .. } => min,
            CapPolicy::Fixed { count } => count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnippetConfig {
    /// When false the raw feed snippet is used as-is.
    pub enabled: bool,
    pub max_length: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 280,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Move the trigger after each post. Off for manual runs.
    pub enabled: bool,
    pub rule_name: String,
    pub min_hours: f64,
    pub max_hours: f64,
    pub trigger: TriggerConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rule_name: "random-poster".to_string(),
            min_hours: 1.0,
            max_hours: 6.0,
            trigger: TriggerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum TriggerConfig {
    File { path: PathBuf },
    EventBridge,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::File {
            path: PathBuf::from("schedule.json"),
        }
    }
}

impl Config {
    /// Load the YAML file at `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        info!("Loaded configuration");
        Ok(config)
    }

    /// Build the effective configuration from CLI arguments: file first (if
    /// any), then the manual-variant preset, then explicit overrides.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Config::from_file(Path::new(path))?,
            None => Config::default(),
        };

        if cli.manual {
            config.cap = CapPolicy::Fixed {
                count: MANUAL_MAX_ITEMS,
            };
            config.snippet.enabled = false;
            config.schedule.enabled = false;
        }
        if let Some(n) = cli.max_items {
            config.cap = CapPolicy::Fixed { count: n };
        }

        if let Some(token) = &cli.api_token {
            config.feed.api_token = token.clone();
        }
        if let Some(user) = &cli.instagram_username {
            config.platform.username = user.clone();
        }
        if let Some(pass) = &cli.instagram_password {
            config.platform.password = pass.clone();
        }
        if let Some(user) = &cli.email_user {
            config.mailbox.username = user.clone();
        }
        if let Some(pass) = &cli.email_password {
            config.mailbox.password = pass.clone();
        }
        if let Some(bucket) = &cli.bucket_name {
            if !cli.manual {
                config.ledger = LedgerConfig::S3 {
                    bucket: bucket.clone(),
                    key: LEDGER_KEY.to_string(),
                };
            }
        }
        if let Some(dir) = &cli.staging_dir {
            config.staging_dir = Some(PathBuf::from(dir));
        }

        debug!(cap = ?config.cap, ledger = ?config.ledger, "Resolved configuration");
        config.validate()?;
        Ok(config)
    }

    /// Check that credentials and numeric ranges make sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("feed.api_token", &self.feed.api_token),
            ("platform.username", &self.platform.username),
            ("platform.password", &self.platform.password),
            ("mailbox.username", &self.mailbox.username),
            ("mailbox.password", &self.mailbox.password),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }

        if let CapPolicy::Random { min, max } = self.cap {
            if min == 0 || min > max {
                return Err(ConfigError::Invalid {
                    field: "cap".to_string(),
                    reason: format!("random range {min}..={max} is empty or starts at zero"),
                });
            }
        }
        if !(self.schedule.min_hours > 0.0 && self.schedule.min_hours <= self.schedule.max_hours) {
            return Err(ConfigError::Invalid {
                field: "schedule".to_string(),
                reason: format!(
                    "jitter range {}..{} hours is invalid",
                    self.schedule.min_hours, self.schedule.max_hours
                ),
            });
        }
        Ok(())
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
