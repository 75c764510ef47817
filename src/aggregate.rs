//! Weekly aggregation: merge the seven daily records of a week into one article set.

use anyhow::Result;
use std::collections::HashMap;

use crate::model::{Article, DailyRecord};
use crate::storage::{daily_key, load_json, Storage};
use crate::week::WeekId;

#[derive(Debug, Clone, Default)]
pub struct WeekLoad {
    /// Unique by id, sorted by id.
    pub articles: Vec<Article>,
    /// Daily records found (0..=7).
    pub days_found: usize,
    /// Articles read before deduplication.
    pub records_read: usize,
}

/// Read `daily/<date>` for Monday..Sunday of `week` and dedupe by article id.
///
/// Duplicates resolve to the copy with the latest `classification_timestamp`;
/// on equal timestamps the later day wins. Missing days are skipped.
pub async fn load_week(storage: &dyn Storage, week: WeekId) -> Result<WeekLoad> {
    let mut by_id: HashMap<String, Article> = HashMap::new();
    let mut out = WeekLoad::default();

    for day in week.days() {
        let key = daily_key(day);
        let Some(record) = load_json::<DailyRecord>(storage, &key).await? else {
            tracing::debug!(target: "aggregate", key = %key, "no daily record");
            continue;
        };
        out.days_found += 1;
        out.records_read += record.articles.len();
        for article in record.articles {
            match by_id.get(&article.id) {
                Some(prev) if prev.classification_timestamp > article.classification_timestamp => {}
                _ => {
                    by_id.insert(article.id.clone(), article);
                }
            }
        }
    }

    let mut articles: Vec<Article> = by_id.into_values().collect();
    articles.sort_by(|a, b| a.id.cmp(&b.id));
    out.articles = articles;
    tracing::info!(
        target: "aggregate",
        week = %week,
        days = out.days_found,
        read = out.records_read,
        unique = out.articles.len(),
        "week loaded"
    );
    Ok(out)
}
