// src/ingest/types.rs
use anyhow::Result;

use crate::model::{Feed, RawArticle};

/// Feed collaborator: raises on network/parse failure; callers isolate per feed.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed: &Feed) -> Result<Vec<RawArticle>>;
    fn name(&self) -> &'static str;
}

/// Per-feed result of one fetch fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    Fetched { feed_id: String, articles: usize },
    Failed { feed_id: String, error: String },
}

impl FeedOutcome {
    pub fn feed_id(&self) -> &str {
        match self {
            FeedOutcome::Fetched { feed_id, .. } | FeedOutcome::Failed { feed_id, .. } => feed_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FeedOutcome::Failed { .. })
    }
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub articles: Vec<RawArticle>,
    pub outcomes: Vec<FeedOutcome>,
}

impl FetchReport {
    pub fn feeds_ok(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failed()).count()
    }

    pub fn feeds_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}

/// Result of the process stage.
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub articles: Vec<crate::model::Article>,
    /// Entries with neither title nor body after normalization.
    pub dropped_empty: usize,
    /// Entries whose id had already been seen in this batch.
    pub duplicates: usize,
}
