//! Data models for feed items and run results.
//!
//! - [`NewsItem`]: one entry of the news feed, read-only once fetched
//! - [`FeedResponse`]: the JSON envelope returned by the feed endpoint
//! - [`RunReport`]: per-run counters collected by the orchestrator
//! - [`RunResponse`]: the status/body pair printed when a run ends

use serde::{Deserialize, Serialize};

/// A news item as returned by the feed.
///
/// The feed names its identifier `uuid` and its article link `url`; both are
/// mapped onto clearer field names here.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewsItem {
    /// Opaque unique identifier, used as the dedup key.
    #[serde(rename = "uuid")]
    pub id: String,
    /// Lead image for the post.
    #[serde(default)]
    pub image_url: String,
    /// Short teaser text provided by the feed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub snippet: String,
    /// Link to the full article.
    #[serde(rename = "url")]
    pub article_url: String,
    /// Feed categories in feed order.
    #[serde(default)]
    pub categories: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Envelope of the feed endpoint: `{"data": [...]}`.
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub data: Vec<NewsItem>,
}

/// Counters for a single run, logged when the run ends.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Items taken from the head of the feed.
    pub selected: usize,
    /// Items skipped because they were already posted.
    pub already_posted: usize,
    /// Items published and recorded.
    pub published: usize,
    /// Items that failed at download, authentication, or publish.
    pub failed: usize,
}

/// The status/body pair emitted at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl RunResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
        }
    }

    pub fn failed(body: impl Into<String>) -> Self {
        Self {
            status_code: 500,
            body: body.into(),
        }
    }
}
