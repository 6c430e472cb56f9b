//! Error types for the posting pipeline.
//!
//! Each collaborator gets its own error enum so the orchestrator can decide,
//! per failure kind, whether to skip an item, fall through to a cheaper
//! caption source, or end the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed endpoint is not a valid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Feed returned status {0}")]
    Status(u16),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Article request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Article returned status {0}")]
    Status(u16),

    #[error("Article has no readable paragraphs")]
    Empty,
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Image request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image returned status {0}")]
    Status(u16),

    #[error("Failed writing staged image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archiving image failed: {0}")]
    Archive(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger object storage failed: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Mailbox connection failed: {0}")]
    Connect(String),

    #[error("Mailbox login failed: {0}")]
    Login(String),

    #[error("Selecting mailbox {mailbox} failed: {reason}")]
    Select { mailbox: String, reason: String },

    #[error("Mailbox worker panicked: {0}")]
    Worker(String),

    #[error("Mailbox session timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Second factor required: {0}")]
    SecondFactorRequired(String),

    #[error("Bad credentials: {0}")]
    BadCredentials(String),

    #[error("Platform rejected request: {0}")]
    Rejected(String),

    #[error("Platform transport error: {0}")]
    Transport(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Transport(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    /// The mailbox could not be reached at all; no later item can log in either.
    #[error("Mailbox unavailable: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("No second-factor code found in mailbox")]
    CodeNotFound,

    #[error("Login failed: {0}")]
    Login(PlatformError),

    #[error("Login with second factor failed: {0}")]
    SecondFactor(PlatformError),
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Writing schedule trigger failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding schedule trigger failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Schedule service failed: {0}")]
    Service(String),

    #[error("Computed run time is out of range")]
    OutOfRange,
}

/// Failures that end a run early.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Loading dedup ledger failed: {0}")]
    LedgerLoad(#[source] LedgerError),

    #[error("Authentication cannot proceed: {0}")]
    Mailbox(#[source] MailboxError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::LedgerLoad(_) => "ledger",
            PipelineError::Mailbox(_) => "mailbox",
        }
    }
}
