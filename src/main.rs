//! # News Poster
//!
//! Posts trending news items to Instagram and reschedules itself with random
//! jitter so the account does not post on a fixed cadence.
//!
//! ## Usage
//!
//! ```sh
//! news_poster --config config.yaml
//! news_poster --manual
//! ```
//!
//! ## Architecture
//!
//! One invocation is one run of the [`pipeline::Pipeline`]:
//! 1. **Ledger**: load the ids already posted (local file or S3 object)
//! 2. **Feed**: fetch the top stories and take a capped prefix
//! 3. **Caption**: article text, cleaned snippet, or raw snippet, plus link and hashtags
//! 4. **Publish**: stage (and, next to an S3 ledger, archive) the image, log in
//!    (with the emailed 2FA code if asked), upload
//! 5. **Bookkeeping**: record the id and move the schedule trigger 1-6 hours ahead
//!    (not in `--manual` runs)

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod article;
mod auth;
mod caption;
mod cli;
mod config;
mod error;
mod feed;
mod ledger;
mod mailbox;
mod models;
mod pipeline;
mod platform;
mod scheduler;
mod snippet;
mod staging;
#[cfg(test)]
mod testing;
mod utils;

use article::HttpArticleSource;
use auth::Authenticator;
use cli::Cli;
use config::{Config, LedgerConfig, TriggerConfig};
use feed::HttpFeed;
use ledger::{FileStore, LedgerStore};
use mailbox::ImapCodeSource;
use models::RunResponse;
use pipeline::{Pipeline, RunSettings, SnippetPolicy};
use platform::InstagramClient;
use scheduler::{FileTrigger, Scheduler, TriggerStore};
use staging::{HttpImageStager, ImageArchive};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_poster starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, manual = args.manual, max_items = ?args.max_items, "Parsed CLI arguments");

    let config = match Config::resolve(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let staging_dir = config.staging_dir();
    if let Err(e) = ensure_writable_dir(&staging_dir).await {
        error!(
            path = %staging_dir.display(),
            error = %e,
            "Staging directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let mut pipeline = build_pipeline(&config).await?;
    let response = match pipeline.run().await {
        Ok(report) if report.selected == 0 => RunResponse::ok("No news items found."),
        Ok(report) => {
            info!(
                published = report.published,
                failed = report.failed,
                already_posted = report.already_posted,
                "Run finished"
            );
            RunResponse::ok("News posted successfully!")
        }
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Run aborted");
            println!("{}", serde_json::to_string(&RunResponse::failed(e.to_string()))?);
            return Err(e.into());
        }
    };
    println!("{}", serde_json::to_string(&response)?);

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}

/// Wire every collaborator from the resolved configuration.
#[instrument(level = "info", skip_all)]
async fn build_pipeline(config: &Config) -> Result<Pipeline, Box<dyn Error>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.feed.timeout_secs))
        .build()?;

    let ledger_store = ledger_store(&config.ledger).await?;

    let auth = Authenticator::new(
        Box::new(InstagramClient::new()?),
        Box::new(ImapCodeSource::new(config.mailbox.clone())),
        &config.platform,
    );
    let snippet = if config.snippet.enabled {
        SnippetPolicy::Synthesize {
            max_length: config.snippet.max_length,
        }
    } else {
        SnippetPolicy::PassThrough
    };

    let scheduler = if config.schedule.enabled {
        Some(Scheduler::new(trigger_store(&config.schedule.trigger).await?, &config.schedule))
    } else {
        info!("Rescheduling disabled for this run");
        None
    };

    let mut pipeline = Pipeline::new(
        Box::new(HttpFeed::new(http.clone(), &config.feed)),
        Box::new(HttpArticleSource::new(http.clone())),
        Box::new(HttpImageStager::new(http, config.staging_dir())),
        ledger_store,
        auth,
        scheduler,
        RunSettings {
            hashtags: config.hashtags.clone(),
            cap: config.cap,
            snippet,
        },
    );
    if let Some(archive) = image_archive(&config.ledger).await {
        info!(archive = %archive.describe(), "Archiving staged images");
        pipeline = pipeline.with_archive(archive);
    }
    Ok(pipeline)
}

async fn ledger_store(config: &LedgerConfig) -> Result<Arc<dyn LedgerStore>, Box<dyn Error>> {
    match config {
        LedgerConfig::File { path } => Ok(Arc::new(FileStore::new(path))),
        #[cfg(feature = "aws")]
        LedgerConfig::S3 { bucket, key } => {
            let shared = aws_config::load_from_env().await;
            Ok(Arc::new(ledger::S3Store::new(
                aws_sdk_s3::Client::new(&shared),
                bucket.clone(),
                key.clone(),
            )))
        }
        #[cfg(not(feature = "aws"))]
        LedgerConfig::S3 { bucket, .. } => {
            Err(format!("S3 ledger in bucket {bucket} needs a build with the `aws` feature").into())
        }
    }
}

/// Staged images are archived next to an S3 ledger; a local ledger has no archive.
#[cfg(feature = "aws")]
async fn image_archive(config: &LedgerConfig) -> Option<Box<dyn ImageArchive>> {
    match config {
        LedgerConfig::S3 { bucket, .. } => {
            let shared = aws_config::load_from_env().await;
            Some(Box::new(staging::S3ImageArchive::new(
                aws_sdk_s3::Client::new(&shared),
                bucket.clone(),
            )))
        }
        LedgerConfig::File { .. } => None,
    }
}

#[cfg(not(feature = "aws"))]
async fn image_archive(_config: &LedgerConfig) -> Option<Box<dyn ImageArchive>> {
    None
}

async fn trigger_store(config: &TriggerConfig) -> Result<Box<dyn TriggerStore>, Box<dyn Error>> {
    match config {
        TriggerConfig::File { path } => Ok(Box::new(FileTrigger::new(path))),
        #[cfg(feature = "aws")]
        TriggerConfig::EventBridge => {
            let shared = aws_config::load_from_env().await;
            Ok(Box::new(scheduler::EventBridgeTrigger::new(
                aws_sdk_eventbridge::Client::new(&shared),
            )))
        }
        #[cfg(not(feature = "aws"))]
        TriggerConfig::EventBridge => {
            Err("EventBridge trigger needs a build with the `aws` feature".into())
        }
    }
}
