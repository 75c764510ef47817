//! Ranking: one `RankedArticle` per (article, scored category).
//!
//! rank_score = relevance/100 * category.weight
//!            + authority_bonus(feed.authority_score)
//!            + recency_bonus(published_date, now)
//!
//! Ordering within a category: rank_score desc, published_date desc, id asc.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::categories::CategoryRegistry;
use crate::config::settings::RankingSettings;
use crate::config::ConfigSnapshot;
use crate::model::{Article, Feed, RankedArticle, ScoreBreakdown};

const SECS_PER_DAY: f64 = 86_400.0;

/// `authority/100`, clamped to `[0, cap]`. Monotonic and bounded.
pub fn authority_bonus(authority_score: f64, cap: f64) -> f64 {
    if !authority_score.is_finite() {
        return 0.0;
    }
    (authority_score / 100.0).clamp(0.0, cap.max(0.0))
}

/// Linear decay from `max_bonus` at age 0 to 0 at `window_days`; never negative.
/// Future-dated articles count as age 0.
pub fn recency_bonus(published: DateTime<Utc>, now: DateTime<Utc>, window_days: f64, max_bonus: f64) -> f64 {
    if window_days <= 0.0 {
        return 0.0;
    }
    let age_days = ((now - published).num_seconds().max(0) as f64) / SECS_PER_DAY;
    (max_bonus * (1.0 - age_days / window_days)).max(0.0)
}

/// Total order used for every reading list.
pub fn rank_order(a: &RankedArticle, b: &RankedArticle) -> Ordering {
    b.rank_score
        .total_cmp(&a.rank_score)
        .then_with(|| b.article.published_date.cmp(&a.article.published_date))
        .then_with(|| a.article.id.cmp(&b.article.id))
}

pub struct Ranker {
    /// category id → (registry position, weight)
    categories: HashMap<String, (usize, f64)>,
    authority: HashMap<String, f64>,
    settings: RankingSettings,
    now: DateTime<Utc>,
}

impl Ranker {
    pub fn new(snapshot: &ConfigSnapshot, now: DateTime<Utc>) -> Self {
        Self::from_parts(
            &snapshot.categories,
            &snapshot.feeds,
            snapshot.settings.ranking,
            now,
        )
    }

    /// Inactive feeds keep their authority: their earlier articles still rank.
    pub fn from_parts(
        categories: &CategoryRegistry,
        feeds: &[Feed],
        settings: RankingSettings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            categories: categories
                .iter()
                .enumerate()
                .map(|(i, c)| (c.id.clone(), (i, c.weight)))
                .collect(),
            authority: feeds
                .iter()
                .map(|f| (f.id.clone(), f.authority_score))
                .collect(),
            settings,
            now,
        }
    }

    pub fn breakdown(&self, article: &Article, category_id: &str, relevance: f64) -> Option<ScoreBreakdown> {
        let (_, weight) = self.categories.get(category_id)?;
        let authority = self
            .authority
            .get(&article.source_feed)
            .copied()
            .unwrap_or(self.settings.unknown_feed_authority);
        Some(ScoreBreakdown {
            relevance: relevance.clamp(0.0, 100.0) / 100.0,
            category_weight: *weight,
            authority_bonus: authority_bonus(authority, self.settings.authority_cap),
            recency_bonus: recency_bonus(
                article.published_date,
                self.now,
                self.settings.recency_window_days,
                self.settings.recency_max_bonus,
            ),
        })
    }

    /// Fan out every article into its scored categories. Output is grouped by
    /// category (taxonomy order) and sorted by `rank_order` inside each group.
    pub fn rank_articles(&self, articles: &[Article]) -> Vec<RankedArticle> {
        let mut out = Vec::new();
        for article in articles {
            if article.category_scores.is_empty() {
                tracing::warn!(target: "rank", article = %article.id, "article has no category scores; skipped");
                continue;
            }
            for (category_id, relevance) in &article.category_scores {
                let Some(b) = self.breakdown(article, category_id, *relevance) else {
                    tracing::warn!(target: "rank", article = %article.id, category = %category_id, "unknown category; skipped");
                    continue;
                };
                out.push(RankedArticle {
                    article: article.clone(),
                    rank_category: category_id.clone(),
                    rank_score: b.relevance * b.category_weight + b.authority_bonus + b.recency_bonus,
                    breakdown: b,
                });
            }
        }

        out.sort_by(|a, b| {
            self.position(&a.rank_category)
                .cmp(&self.position(&b.rank_category))
                .then_with(|| rank_order(a, b))
        });
        counter!("curate_ranked_total").increment(out.len() as u64);
        out
    }

    fn position(&self, category_id: &str) -> usize {
        self.categories
            .get(category_id)
            .map(|(i, _)| *i)
            .unwrap_or(usize::MAX)
    }
}
