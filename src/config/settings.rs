//! Runtime settings from `config/curator.toml`.
//!
//! Every section and field has a default, so a missing file (or a file that
//! only sets a few keys) still yields a complete `Settings`. Out-of-range
//! values are sanitized on load instead of failing the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::categories::DEFAULT_FALLBACK_CATEGORY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub classify: ClassifySettings,
    pub fetch: FetchSettings,
    pub ranking: RankingSettings,
    pub curation: CurationSettings,
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory for `daily/` and `curated/weekly/` documents.
    pub root: String,
    /// Directory for the AI response cache and daily call counter.
    pub ai_cache_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "data".to_string(),
            ai_cache_dir: "cache/ai".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifySettings {
    /// Maximum in-flight classification requests.
    pub concurrency: usize,
    /// Per-request timeout; expiry is a per-article failure.
    pub timeout_secs: u64,
    /// Request starts per minute (0 = unpaced).
    pub requests_per_minute: u32,
    /// Scores at or below this are dropped from `category_scores`.
    pub min_relevance: f64,
    /// Characters of article body included in the prompt.
    pub content_prefix_chars: usize,
    pub fallback_category: String,
    pub fallback_score: f64,
}

impl Default for ClassifySettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 30,
            requests_per_minute: 50,
            min_relevance: 10.0,
            content_prefix_chars: 2000,
            fallback_category: DEFAULT_FALLBACK_CATEGORY.to_string(),
            fallback_score: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_feed_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "devblog-curator/0.1".to_string(),
            max_feed_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Upper bound of the authority contribution (authority_score / 100, capped).
    pub authority_cap: f64,
    /// Age at which the recency bonus reaches zero.
    pub recency_window_days: f64,
    /// Bonus for an article published "now".
    pub recency_max_bonus: f64,
    /// Authority assumed for articles whose feed is no longer configured.
    pub unknown_feed_authority: f64,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            authority_cap: 1.0,
            recency_window_days: 14.0,
            recency_max_bonus: 0.5,
            unknown_feed_authority: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationSettings {
    pub max_list_size: usize,
}

impl Default for CurationSettings {
    fn default() -> Self {
        Self { max_list_size: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DiscoverySettings {
    pub candidates: Vec<FeedCandidate>,
}

/// A feed proposed for the registry; validated by fetching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCandidate {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_estimated_authority")]
    pub estimated_authority: f64,
}

fn default_estimated_authority() -> f64 {
    50.0
}

impl Settings {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let parsed: Settings = toml::from_str(&content)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(parsed.sanitized())
    }

    /// Missing file → defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    fn sanitized(mut self) -> Self {
        let c = &mut self.classify;
        c.concurrency = c.concurrency.max(1);
        c.timeout_secs = c.timeout_secs.max(1);
        c.min_relevance = c.min_relevance.clamp(0.0, 100.0);
        c.fallback_score = c.fallback_score.clamp(0.0, 100.0);
        if c.content_prefix_chars == 0 {
            c.content_prefix_chars = ClassifySettings::default().content_prefix_chars;
        }

        self.fetch.timeout_secs = self.fetch.timeout_secs.max(1);

        let r = &mut self.ranking;
        if !(r.authority_cap.is_finite() && r.authority_cap >= 0.0) {
            r.authority_cap = RankingSettings::default().authority_cap;
        }
        if !(r.recency_window_days.is_finite() && r.recency_window_days > 0.0) {
            r.recency_window_days = RankingSettings::default().recency_window_days;
        }
        if !(r.recency_max_bonus.is_finite() && r.recency_max_bonus >= 0.0) {
            r.recency_max_bonus = RankingSettings::default().recency_max_bonus;
        }

        self.curation.max_list_size = self.curation.max_list_size.max(1);
        self
    }
}
