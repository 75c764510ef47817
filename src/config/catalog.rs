// src/config/catalog.rs
//! Category and feed definitions (`categories.toml` / `feeds.toml`, JSON also accepted).

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::model::{Category, Feed};

/// Configuration problems that must stop a run before any stage executes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("expected exactly {expected} categories, found {found}")]
    CategoryCount { expected: usize, found: usize },

    #[error("invalid category '{id}': {reason}")]
    InvalidCategory { id: String, reason: String },

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("invalid feed '{id}': {reason}")]
    InvalidFeed { id: String, reason: String },

    #[error("fallback category '{0}' is not part of the taxonomy")]
    UnknownFallbackCategory(String),
}

#[derive(Deserialize)]
struct CategoriesFile {
    categories: Vec<Category>,
}

#[derive(Deserialize)]
struct FeedsFile {
    feeds: Vec<Feed>,
}

/// Load raw category records. Taxonomy validation happens in `CategoryRegistry::new`.
pub fn load_categories_from(path: &Path) -> Result<Vec<Category>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading categories from {}", path.display()))?;
    let file: CategoriesFile = parse_by_extension(&content, path)
        .with_context(|| format!("parsing categories in {}", path.display()))?;
    Ok(file
        .categories
        .into_iter()
        .map(|mut c| {
            c.id = c.id.trim().to_string();
            c.keywords = clean_list(c.keywords);
            c
        })
        .collect())
}

pub fn load_feeds_from(path: &Path) -> Result<Vec<Feed>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let file: FeedsFile = parse_by_extension(&content, path)
        .with_context(|| format!("parsing feeds in {}", path.display()))?;
    let feeds: Vec<Feed> = file
        .feeds
        .into_iter()
        .map(|mut f| {
            f.id = f.id.trim().to_string();
            f.url = f.url.trim().to_string();
            f.category_hints = clean_list(f.category_hints);
            f.tags = clean_list(f.tags);
            f
        })
        .collect();
    validate_feeds(&feeds)?;
    Ok(feeds)
}

pub fn validate_feeds(feeds: &[Feed]) -> std::result::Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for f in feeds {
        if f.id.is_empty() || f.url.is_empty() {
            return Err(ConfigError::InvalidFeed {
                id: f.id.clone(),
                reason: "id and url must be non-empty".into(),
            });
        }
        if !(f.authority_score.is_finite() && (0.0..=100.0).contains(&f.authority_score)) {
            return Err(ConfigError::InvalidFeed {
                id: f.id.clone(),
                reason: format!("authority_score must be within 0..=100 (got {})", f.authority_score),
            });
        }
        if !seen.insert(f.id.as_str()) {
            return Err(ConfigError::DuplicateId {
                kind: "feed",
                id: f.id.clone(),
            });
        }
    }
    Ok(())
}

fn parse_by_extension<T: serde::de::DeserializeOwned>(s: &str, path: &Path) -> Result<T> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        other => Err(anyhow!("unsupported config format '{other}' (expected toml or json)")),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_string();
        if !t.is_empty() && seen.insert(t.clone()) {
            out.push(t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feeds_toml_parses_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("feeds.toml");
        fs::write(
            &p,
            r#"
[[feeds]]
id = " netflix "
name = "Netflix Tech Blog"
url = "https://netflixtechblog.com/feed"
authority_score = 90
category_hints = ["system_design", "", "system_design"]

[[feeds]]
id = "old"
name = "Retired"
url = "https://old.test/rss"
authority_score = 10
status = "inactive"
"#,
        )
        .unwrap();
        let feeds = load_feeds_from(&p).unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].id, "netflix");
        assert_eq!(feeds[0].category_hints, vec!["system_design".to_string()]);
        assert!(feeds[0].is_active());
        assert!(!feeds[1].is_active());
    }

    #[test]
    fn duplicate_feed_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("feeds.json");
        fs::write(
            &p,
            r#"{"feeds":[
                {"id":"a","name":"A","url":"https://a.test","authority_score":10},
                {"id":"a","name":"A2","url":"https://a2.test","authority_score":20}
            ]}"#,
        )
        .unwrap();
        let err = load_feeds_from(&p).unwrap_err();
        assert!(err.to_string().contains("duplicate feed id"));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("categories.yaml");
        fs::write(&p, "categories: []").unwrap();
        assert!(load_categories_from(&p).is_err());
    }
}
