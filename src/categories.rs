//! # Category Registry
//!
//! The fixed taxonomy of eight categories that articles are scored against.
//!
//! - Loaded once per run (from `config/categories.toml` or the built-in seed).
//! - Insertion order is preserved; it is the order used in prompts and list output.
//! - Validation rejects partial taxonomies: exactly eight entries, unique ids,
//!   non-empty names, and strictly positive weights.

use std::collections::HashSet;

use crate::config::catalog::ConfigError;
use crate::model::Category;

/// Number of categories every run must carry.
pub const TAXONOMY_SIZE: usize = 8;

/// Category used by the fallback classification.
pub const DEFAULT_FALLBACK_CATEGORY: &str = "technical_excellence";

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    /// Build a registry and validate it.
    pub fn new(categories: Vec<Category>) -> Result<Self, ConfigError> {
        let reg = Self { categories };
        reg.validate()?;
        Ok(reg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.len() != TAXONOMY_SIZE {
            return Err(ConfigError::CategoryCount {
                expected: TAXONOMY_SIZE,
                found: self.categories.len(),
            });
        }
        let mut seen = HashSet::new();
        for c in &self.categories {
            if c.id.trim().is_empty() || c.name.trim().is_empty() {
                return Err(ConfigError::InvalidCategory {
                    id: c.id.clone(),
                    reason: "id and name must be non-empty".into(),
                });
            }
            if !(c.weight.is_finite() && c.weight > 0.0) {
                return Err(ConfigError::InvalidCategory {
                    id: c.id.clone(),
                    reason: format!("weight must be > 0 (got {})", c.weight),
                });
            }
            if !seen.insert(c.id.as_str()) {
                return Err(ConfigError::DuplicateId {
                    kind: "category",
                    id: c.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Built-in taxonomy, used when no categories file is present.
    pub fn default_seed() -> Self {
        let categories = [
            (
                "technical_excellence",
                "Technical Excellence",
                "Engineering craft: code quality, testing, performance, language deep dives.",
                1.0,
                &["refactoring", "testing", "performance", "compiler", "algorithm", "code review"][..],
            ),
            (
                "system_design",
                "System Design & Architecture",
                "Distributed systems, scalability, data modelling, and architecture trade-offs.",
                1.0,
                &["architecture", "distributed", "scalability", "database", "microservices", "consistency"][..],
            ),
            (
                "devops_reliability",
                "DevOps & Reliability",
                "Operations, CI/CD, observability, incident response, and SRE practice.",
                0.9,
                &["kubernetes", "deployment", "observability", "incident", "ci/cd", "on-call"][..],
            ),
            (
                "security",
                "Security",
                "Application and infrastructure security, vulnerabilities, and secure design.",
                0.9,
                &["vulnerability", "authentication", "encryption", "exploit", "supply chain", "cve"][..],
            ),
            (
                "ai_ml",
                "AI & Machine Learning",
                "Applied machine learning, LLMs, and AI tooling for engineers.",
                0.8,
                &["llm", "machine learning", "model", "embedding", "inference", "neural"][..],
            ),
            (
                "developer_experience",
                "Developer Experience & Tooling",
                "Editors, build systems, workflows, and tooling that make developers productive.",
                0.8,
                &["tooling", "editor", "build system", "workflow", "productivity", "cli"][..],
            ),
            (
                "leadership_management",
                "Leadership & Management",
                "Engineering management, team building, culture, and technical leadership.",
                0.9,
                &["manager", "leadership", "team", "hiring", "culture", "staff engineer"][..],
            ),
            (
                "career_growth",
                "Career Growth",
                "Skill development, interviews, promotions, and career paths in software.",
                0.9,
                &["career", "interview", "promotion", "mentoring", "learning", "burnout"][..],
            ),
        ]
        .into_iter()
        .map(|(id, name, description, weight, keywords)| Category {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            weight,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        })
        .collect();

        Self { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_is_a_valid_taxonomy() {
        let seed = CategoryRegistry::default_seed();
        assert_eq!(seed.len(), TAXONOMY_SIZE);
        assert!(seed.validate().is_ok());
        assert!(seed.contains(DEFAULT_FALLBACK_CATEGORY));
    }

    #[test]
    fn rejects_wrong_count() {
        let mut cats: Vec<Category> = CategoryRegistry::default_seed().iter().cloned().collect();
        cats.pop();
        let err = CategoryRegistry::new(cats).unwrap_err();
        assert!(matches!(err, ConfigError::CategoryCount { found: 7, .. }));
    }

    #[test]
    fn rejects_non_positive_weight() {
        let mut cats: Vec<Category> = CategoryRegistry::default_seed().iter().cloned().collect();
        cats[3].weight = 0.0;
        let err = CategoryRegistry::new(cats).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCategory { .. }));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut cats: Vec<Category> = CategoryRegistry::default_seed().iter().cloned().collect();
        cats[7].id = cats[0].id.clone();
        let err = CategoryRegistry::new(cats).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId { .. }));
    }

    #[test]
    fn preserves_configured_order() {
        let seed = CategoryRegistry::default_seed();
        let first = seed.ids().next().unwrap();
        assert_eq!(first, "technical_excellence");
    }
}
