//! News feed client.
//!
//! One GET against the top-stories endpoint with the API token and locale as
//! query parameters; the `data` array of the JSON body is the candidate list,
//! in feed order.

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::models::{FeedResponse, NewsItem};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NewsItem>, FeedError>;
}

pub struct HttpFeed {
    http: reqwest::Client,
    endpoint: String,
    api_token: String,
    locale: String,
}

impl HttpFeed {
    pub fn new(http: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            api_token: config.api_token.clone(),
            locale: config.locale.clone(),
        }
    }

    fn request_url(&self) -> Result<Url, FeedError> {
        Ok(Url::parse_with_params(
            &self.endpoint,
            &[("api_token", self.api_token.as_str()), ("locale", self.locale.as_str())],
        )?)
    }
}

#[async_trait]
impl NewsFeed for HttpFeed {
    #[instrument(level = "info", skip(self), fields(endpoint = %self.endpoint, locale = %self.locale))]
    async fn fetch(&self) -> Result<Vec<NewsItem>, FeedError> {
        let resp = self.http.get(self.request_url()?).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            warn!(%status, "Failed to fetch news");
            return Err(FeedError::Status(status.as_u16()));
        }
        let feed: FeedResponse = resp.json().await?;
        info!(count = feed.data.len(), "Fetched news items");
        debug!(ids = ?feed.data.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), "Feed item ids");
        Ok(feed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{direct_client, serve};

    fn config(endpoint: String) -> FeedConfig {
        FeedConfig {
            endpoint,
            api_token: "tok&en".to_string(),
            ..FeedConfig::default()
        }
    }

    #[test]
    fn test_request_url_encodes_params() {
        let feed = HttpFeed::new(direct_client(), &config("https://api.example.com/v1/news/top".to_string()));
        assert_eq!(
            feed.request_url().unwrap().as_str(),
            "https://api.example.com/v1/news/top?api_token=tok%26en&locale=us"
        );
    }

    #[tokio::test]
    async fn test_fetch_parses_data() {
        let body = br#"{"data":[{"uuid":"a1","image_url":"i","snippet":"s","url":"u","categories":["general"]}]}"#;
        let base = serve(vec![("/v1/news/top", 200, body.to_vec())]).await;
        let feed = HttpFeed::new(direct_client(), &config(format!("{base}/v1/news/top")));

        let items = feed.fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a1");
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_error() {
        let base = serve(vec![("/v1/news/top", 401, b"{}".to_vec())]).await;
        let feed = HttpFeed::new(direct_client(), &config(format!("{base}/v1/news/top")));

        let err = feed.fetch().await.unwrap_err();
        assert!(matches!(err, FeedError::Status(401)));
    }
}
