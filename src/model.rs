//! # Data model
//! Records that flow through the pipeline:
//! `RawArticle` (feed source) → `Article` (processed, then classified once) →
//! `RankedArticle` (one per qualifying category) → `ReadingList` (per category, per week).
//!
//! Every persisted record derives serde so the storage codec round-trips it
//! field for field, including `category_scores` and `classification_timestamp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Category id → relevance in `[0, 100]`.
/// `BTreeMap` keeps serialization order stable across runs.
pub type CategoryScores = BTreeMap<String, f64>;

/// One taxonomy entry. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Ranking multiplier; must be > 0.
    pub weight: f64,
    /// Prompt-building hints (also drive the keyword mock provider).
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    #[default]
    Active,
    Inactive,
}

/// A content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// 0..100 scale; bounded into the ranking by `authority_bonus`.
    pub authority_score: f64,
    #[serde(default)]
    pub category_hints: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: FeedStatus,
}

impl Feed {
    pub fn is_active(&self) -> bool {
        self.status == FeedStatus::Active
    }
}

/// Entry as returned by a feed source, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub source_feed: String,
    pub tags: Vec<String>,
}

/// A single ingested blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub published_date: DateTime<Utc>,
    /// Weak reference to `Feed::id` (lookup only).
    pub source_feed: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,

    // Added by classification.
    #[serde(default)]
    pub category_scores: CategoryScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_timestamp: Option<DateTime<Utc>>,
    /// Present only when the fallback mapping was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_error: Option<String>,
}

impl Article {
    /// Text used for prompting: full content when the feed ships it, summary otherwise.
    pub fn body(&self) -> &str {
        match self.content.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => &self.summary,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.classification_timestamp.is_some() && !self.category_scores.is_empty()
    }
}

/// Components that produced a rank score; kept for explainability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Classification relevance normalized to `[0, 1]`, before weighting.
    pub relevance: f64,
    pub category_weight: f64,
    pub authority_bonus: f64,
    pub recency_bonus: f64,
}

/// An article listed under one category with its independently computed score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedArticle {
    pub article: Article,
    pub rank_category: String,
    pub rank_score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Ordered, capped list for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingList {
    pub category_id: String,
    pub category_name: String,
    pub entries: Vec<RankedArticle>,
}

impl ReadingList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persisted payload under `daily/<date>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: chrono::NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub articles: Vec<Article>,
}

/// Persisted payload under `curated/weekly/<week_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyCuration {
    pub week: crate::week::WeekId,
    pub generated_at: DateTime<Utc>,
    /// Instant recency was measured from: the week's end, or the run time
    /// while the week is still open.
    pub ranked_at: DateTime<Utc>,
    pub articles_considered: usize,
    pub lists: BTreeMap<String, ReadingList>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Article {
        Article {
            id: "https://blog.example/post-1".into(),
            title: "Post".into(),
            url: "https://blog.example/post-1".into(),
            summary: "short".into(),
            content: None,
            author: None,
            published_date: Utc.with_ymd_and_hms(2026, 10, 12, 8, 0, 0).unwrap(),
            source_feed: "example".into(),
            tags: BTreeSet::new(),
            category_scores: CategoryScores::new(),
            classification_timestamp: None,
            classification_error: None,
        }
    }

    #[test]
    fn body_prefers_content_over_summary() {
        let mut a = sample();
        assert_eq!(a.body(), "short");
        a.content = Some("   ".into());
        assert_eq!(a.body(), "short");
        a.content = Some("full text".into());
        assert_eq!(a.body(), "full text");
    }

    #[test]
    fn feed_status_defaults_to_active() {
        let f: Feed = serde_json::from_str(
            r#"{"id":"a","name":"A","url":"https://a.test/rss","authority_score":40}"#,
        )
        .unwrap();
        assert!(f.is_active());
    }
}
