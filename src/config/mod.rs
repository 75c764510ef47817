//! Run-start configuration snapshot.
//!
//! Categories, feeds, and settings are read once and frozen into a
//! `ConfigSnapshot` that every component receives explicitly (usually behind
//! an `Arc`). Nothing re-reads configuration mid-run.

pub mod ai;
pub mod catalog;
pub mod settings;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::categories::CategoryRegistry;
use crate::model::Feed;
use catalog::ConfigError;
use settings::Settings;

pub const DEFAULT_CONFIG_DIR: &str = "config";

pub const ENV_SETTINGS_PATH: &str = "CURATOR_CONFIG_PATH";
pub const ENV_CATEGORIES_PATH: &str = "CURATOR_CATEGORIES_PATH";
pub const ENV_FEEDS_PATH: &str = "CURATOR_FEEDS_PATH";

#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub categories: CategoryRegistry,
    pub feeds: Vec<Feed>,
    pub settings: Settings,
    pub loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Assemble a snapshot from already-parsed parts, enforcing cross-file invariants.
    pub fn from_parts(
        categories: CategoryRegistry,
        feeds: Vec<Feed>,
        settings: Settings,
    ) -> std::result::Result<Self, ConfigError> {
        catalog::validate_feeds(&feeds)?;
        if !categories.contains(&settings.classify.fallback_category) {
            return Err(ConfigError::UnknownFallbackCategory(
                settings.classify.fallback_category.clone(),
            ));
        }
        Ok(Self {
            categories,
            feeds,
            settings,
            loaded_at: Utc::now(),
        })
    }

    /// Load everything from a config directory.
    ///
    /// Lookup per file: env override → `<dir>/<name>.toml` → `<dir>/<name>.json`.
    /// Categories and feeds are required; `curator.toml` is optional.
    pub fn load(dir: &Path) -> Result<Self> {
        let settings_path = std::env::var(ENV_SETTINGS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| dir.join("curator.toml"));
        let settings = Settings::load_or_default(&settings_path)?;

        let categories_path = resolve(dir, ENV_CATEGORIES_PATH, "categories")?;
        let categories = CategoryRegistry::new(catalog::load_categories_from(&categories_path)?)
            .with_context(|| format!("validating {}", categories_path.display()))?;

        let feeds_path = resolve(dir, ENV_FEEDS_PATH, "feeds")?;
        let feeds = catalog::load_feeds_from(&feeds_path)?;

        let snapshot = Self::from_parts(categories, feeds, settings)?;
        tracing::info!(
            target: "config",
            categories = snapshot.categories.len(),
            feeds = snapshot.feeds.len(),
            active_feeds = snapshot.active_feeds().count(),
            "configuration snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn active_feeds(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter().filter(|f| f.is_active())
    }

    pub fn feed(&self, id: &str) -> Option<&Feed> {
        self.feeds.iter().find(|f| f.id == id)
    }
}

fn resolve(dir: &Path, env_key: &str, stem: &str) -> Result<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        anyhow::bail!("{env_key} points to non-existent path {}", pb.display());
    }
    for ext in ["toml", "json"] {
        let p = dir.join(format!("{stem}.{ext}"));
        if p.exists() {
            return Ok(p);
        }
    }
    anyhow::bail!("missing {stem}.toml or {stem}.json in {}", dir.display())
}
