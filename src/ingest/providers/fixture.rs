// src/ingest/providers/fixture.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use crate::ingest::providers::feed_xml::parse_feed;
use crate::ingest::types::FeedSource;
use crate::model::{Feed, RawArticle};

/// Offline feed source: serves stored XML documents keyed by feed id.
/// Feeds without a document fail, exercising the per-feed isolation path.
#[derive(Debug, Default, Clone)]
pub struct FixtureFeedSource {
    docs: HashMap<String, String>,
}

impl FixtureFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(mut self, feed_id: impl Into<String>, xml: impl Into<String>) -> Self {
        self.docs.insert(feed_id.into(), xml.into());
        self
    }
}

#[async_trait]
impl FeedSource for FixtureFeedSource {
    async fn fetch(&self, feed: &Feed) -> Result<Vec<RawArticle>> {
        let xml = self
            .docs
            .get(&feed.id)
            .ok_or_else(|| anyhow!("no fixture document for feed '{}'", feed.id))?;
        parse_feed(xml, &feed.id)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
