//! Reading-list generation from ranked entries.

use std::collections::BTreeMap;

use crate::categories::CategoryRegistry;
use crate::model::{RankedArticle, ReadingList};
use crate::rank::rank_order;

pub struct ListGenerator {
    categories: CategoryRegistry,
    max_list_size: usize,
}

impl ListGenerator {
    pub fn new(categories: CategoryRegistry, max_list_size: usize) -> Self {
        Self {
            categories,
            max_list_size,
        }
    }

    pub fn max_list_size(&self) -> usize {
        self.max_list_size
    }

    /// One list per taxonomy category, including empty ones.
    ///
    /// Entries keep the ranker's order; a group that arrives out of order is
    /// re-sorted with the same comparator before truncation.
    pub fn generate_weekly_lists(&self, ranked: Vec<RankedArticle>) -> BTreeMap<String, ReadingList> {
        let mut groups: BTreeMap<String, Vec<RankedArticle>> = self
            .categories
            .ids()
            .map(|id| (id.to_string(), Vec::new()))
            .collect();

        for entry in ranked {
            match groups.get_mut(&entry.rank_category) {
                Some(g) => g.push(entry),
                None => tracing::warn!(
                    target: "curate",
                    category = %entry.rank_category,
                    article = %entry.article.id,
                    "entry for unknown category dropped"
                ),
            }
        }

        let mut out = BTreeMap::new();
        for (category_id, mut entries) in groups {
            if !entries.windows(2).all(|w| rank_order(&w[0], &w[1]).is_le()) {
                tracing::warn!(target: "curate", category = %category_id, "ranked input out of order; re-sorting");
                entries.sort_by(rank_order);
            }
            entries.truncate(self.max_list_size);
            let category_name = self
                .categories
                .get(&category_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            out.insert(
                category_id.clone(),
                ReadingList {
                    category_id,
                    category_name,
                    entries,
                },
            );
        }
        out
    }
}
