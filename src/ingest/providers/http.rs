use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::settings::FetchSettings;
use crate::ingest::providers::feed_xml::parse_feed;
use crate::ingest::types::FeedSource;
use crate::model::{Feed, RawArticle};

/// Fetches feeds over HTTP(S) with an explicit per-request timeout and body cap.
pub struct HttpFeedSource {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFeedSource {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.timeout_secs.min(10)))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            client,
            max_bytes: settings.max_feed_bytes,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: &Feed) -> Result<Vec<RawArticle>> {
        let mut resp = self
            .client
            .get(&feed.url)
            .send()
            .await
            .with_context(|| format!("GET {}", feed.url))?
            .error_for_status()
            .with_context(|| format!("non-2xx from {}", feed.url))?;

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_bytes {
                anyhow::bail!("feed '{}' too large: {} bytes", feed.id, len);
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .with_context(|| format!("reading body of {}", feed.url))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                anyhow::bail!(
                    "feed '{}' too large: over {} bytes",
                    feed.id,
                    self.max_bytes
                );
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes);
        parse_feed(&body, &feed.id)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
