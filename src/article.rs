//! Full-article text extraction.
//!
//! Downloads the article page and keeps the paragraph text, preferring
//! paragraphs inside `<article>` and falling back to every `<p>` on the page.

use crate::error::ExtractError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{info, instrument};

static ARTICLE_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("article p").unwrap());
static ALL_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

pub const ARTICLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn extract(&self, url: &str) -> Result<String, ExtractError>;
}

/// Paragraph text of an HTML page, one paragraph per block.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let collect = |selector: &Selector| {
        document
            .select(selector)
            .map(|p| p.text().collect::<Vec<_>>().join(" "))
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
    };

    let mut paragraphs = collect(&*ARTICLE_PARAGRAPHS);
    if paragraphs.is_empty() {
        paragraphs = collect(&*ALL_PARAGRAPHS);
    }
    paragraphs.join("\n\n")
}

pub struct HttpArticleSource {
    http: reqwest::Client,
}

impl HttpArticleSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ArticleSource for HttpArticleSource {
    #[instrument(level = "info", skip(self))]
    async fn extract(&self, url: &str) -> Result<String, ExtractError> {
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(ARTICLE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ExtractError::Status(resp.status().as_u16()));
        }
        let body = resp.text().await?;
        let text = extract_text(&body);
        if text.is_empty() {
            return Err(ExtractError::Empty);
        }
        info!(chars = text.chars().count(), "Parsed article");
        Ok(text)
    }
}
