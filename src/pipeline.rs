//! The posting run.
//!
//! A run loads the dedup ledger, fetches the feed, takes a capped prefix of
//! it, and for every item not yet posted builds a caption, stages the image,
//! logs in if needed, publishes, records the id, and reschedules the next run.
//!
//! Items fail independently: a download, login, or publish failure is logged
//! and the loop moves on. Only an unreachable mailbox (no later item could
//! log in either) or an unreadable ledger ends the run with an error. The
//! staged image is dropped before the next item starts, whatever happened.

use crate::article::ArticleSource;
use crate::auth::Authenticator;
use crate::caption::Caption;
use crate::config::CapPolicy;
use crate::error::{AuthError, PipelineError, PlatformError, StageError};
use crate::feed::NewsFeed;
use crate::ledger::{DedupLedger, LedgerStore};
use crate::models::{NewsItem, RunReport};
use crate::scheduler::Scheduler;
use crate::snippet::{clean_snippet, synthesize};
use crate::staging::{ImageArchive, ImageStager};
use crate::utils::truncate_for_log;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Where the caption lead-in comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetPolicy {
    /// Article text, then cleaned feed snippet, then raw feed snippet.
    Synthesize { max_length: usize },
    /// Raw feed snippet as-is.
    PassThrough,
}

/// Per-run settings that are not collaborators.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub hashtags: Vec<String>,
    pub cap: CapPolicy,
    pub snippet: SnippetPolicy,
}

enum ItemOutcome {
    Published,
    /// Posted, but the ledger could not be updated.
    Unrecorded,
}

enum ItemFailure {
    Stage(StageError),
    Auth(AuthError),
    Publish(PlatformError),
    Fatal(PipelineError),
}

impl ItemFailure {
    fn stage(&self) -> &'static str {
        match self {
            ItemFailure::Stage(_) => "download",
            ItemFailure::Auth(_) => "authenticate",
            ItemFailure::Publish(_) => "publish",
            ItemFailure::Fatal(e) => e.stage(),
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemFailure::Stage(e) => write!(f, "{e}"),
            ItemFailure::Auth(e) => write!(f, "{e}"),
            ItemFailure::Publish(e) => write!(f, "{e}"),
            ItemFailure::Fatal(e) => write!(f, "{e}"),
        }
    }
}

pub struct Pipeline {
    feed: Box<dyn NewsFeed>,
    articles: Box<dyn ArticleSource>,
    stager: Box<dyn ImageStager>,
    archive: Option<Box<dyn ImageArchive>>,
    ledger_store: Arc<dyn LedgerStore>,
    auth: Authenticator,
    scheduler: Option<Scheduler>,
    settings: RunSettings,
}

impl Pipeline {
    pub fn new(
        feed: Box<dyn NewsFeed>,
        articles: Box<dyn ArticleSource>,
        stager: Box<dyn ImageStager>,
        ledger_store: Arc<dyn LedgerStore>,
        auth: Authenticator,
        scheduler: Option<Scheduler>,
        settings: RunSettings,
    ) -> Self {
        Self {
            feed,
            articles,
            stager,
            archive: None,
            ledger_store,
            auth,
            scheduler,
            settings,
        }
    }

    /// Keep a copy of every staged image in `archive` before publishing it.
    pub fn with_archive(mut self, archive: Box<dyn ImageArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Execute one run.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        let t0 = Instant::now();
        let mut report = RunReport::default();

        let mut ledger = DedupLedger::load(Arc::clone(&self.ledger_store))
            .await
            .map_err(PipelineError::LedgerLoad)?;

        let items = match self.feed.fetch().await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Feed fetch failed; ending run");
                return Ok(report);
            }
        };
        if items.is_empty() {
            info!("No news items found.");
            return Ok(report);
        }

        let cap = self.settings.cap.draw(&mut rand::rng());
        info!(available = items.len(), cap, already_posted = ledger.len(), "Processing feed");

        for item in items.iter().take(cap) {
            report.selected += 1;

            if ledger.contains(&item.id) {
                info!(item_id = %item.id, "News item has already been posted. Skipping.");
                report.already_posted += 1;
                continue;
            }

            match self.process_item(&mut ledger, item).await {
                Ok(ItemOutcome::Published) => report.published += 1,
                Ok(ItemOutcome::Unrecorded) => {
                    report.published += 1;
                    warn!("Ledger is not accepting writes; not posting further items this run");
                    break;
                }
                Err(ItemFailure::Fatal(e)) => {
                    error!(item_id = %item.id, stage = e.stage(), error = %e, ?report, "Aborting run");
                    return Err(e);
                }
                Err(failure) => {
                    report.failed += 1;
                    error!(item_id = %item.id, stage = failure.stage(), error = %failure, "Item failed; continuing");
                }
            }
        }

        info!(
            ?report,
            auth = ?self.auth.state(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Run complete"
        );
        Ok(report)
    }

    #[instrument(level = "info", skip_all, fields(item_id = %item.id))]
    async fn process_item(
        &mut self,
        ledger: &mut DedupLedger,
        item: &NewsItem,
    ) -> Result<ItemOutcome, ItemFailure> {
        let lead = self.caption_lead(item).await;
        let caption = Caption::new(
            lead,
            &item.article_url,
            &self.settings.hashtags,
            &item.categories,
        )
        .to_string();
        debug!(caption = %truncate_for_log(&caption, 120), "Built caption");

        let staged = self
            .stager
            .stage(&item.image_url, &item.id)
            .await
            .map_err(ItemFailure::Stage)?;

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.archive(&staged, &item.id).await {
                warn!(archive = %archive.describe(), error = %e, "Image archive failed; posting anyway");
            }
        }

        match self.auth.ensure_authenticated().await {
            Ok(()) => {}
            Err(AuthError::Mailbox(e)) => return Err(ItemFailure::Fatal(PipelineError::Mailbox(e))),
            Err(e) => return Err(ItemFailure::Auth(e)),
        }

        let media_id = self
            .auth
            .publish(staged.path(), &caption)
            .await
            .map_err(ItemFailure::Publish)?;
        info!(%media_id, "News item posted");

        let outcome = match ledger.record(&item.id).await {
            Ok(()) => ItemOutcome::Published,
            Err(e) => {
                error!(error = %e, "Posted but could not record; a later run may repost it");
                ItemOutcome::Unrecorded
            }
        };

        if let Some(scheduler) = &self.scheduler {
            if let Err(e) = scheduler.reschedule().await {
                error!(error = %e, "Error updating schedule");
            }
        }

        staged.release();
        Ok(outcome)
    }

    /// Caption lead-in for `item` according to the snippet policy.
    async fn caption_lead(&self, item: &NewsItem) -> String {
        let max_length = match self.settings.snippet {
            SnippetPolicy::PassThrough => return item.snippet.clone(),
            SnippetPolicy::Synthesize { max_length } => max_length,
        };

        match self.articles.extract(&item.article_url).await {
            Ok(text) => {
                let lead = synthesize(&text, max_length);
                if !lead.is_empty() {
                    return lead;
                }
                debug!("Article text produced an empty snippet");
            }
            Err(e) => warn!(url = %item.article_url, error = %e, "Article extraction failed; using feed snippet"),
        }

        let lead = synthesize(&clean_snippet(&item.snippet), max_length);
        if !lead.is_empty() {
            return lead;
        }
        debug!("Cleaned snippet is empty; using raw snippet");
        item.snippet.clone()
    }
}
