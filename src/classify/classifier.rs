//! Single-article classification: request building and score post-processing.

use std::sync::Arc;

use super::ai_adapter::DynClassificationService;
use super::prompt::{truncate_chars, ClassificationRequest, RawScores};
use super::ClassifyError;
use crate::categories::CategoryRegistry;
use crate::config::settings::ClassifySettings;
use crate::model::{Article, CategoryScores};

#[derive(Clone)]
pub struct Classifier {
    service: DynClassificationService,
    categories: Arc<CategoryRegistry>,
    min_relevance: f64,
    prefix_chars: usize,
}

impl Classifier {
    pub fn new(
        service: DynClassificationService,
        categories: Arc<CategoryRegistry>,
        settings: &ClassifySettings,
    ) -> Self {
        Self {
            service,
            categories,
            min_relevance: settings.min_relevance,
            prefix_chars: settings.content_prefix_chars,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.service.provider_name()
    }

    /// Fails with `InvalidArticle` when the title or both content and summary are blank.
    pub fn build_request(&self, article: &Article) -> Result<ClassificationRequest, ClassifyError> {
        if article.title.trim().is_empty() {
            return Err(ClassifyError::InvalidArticle {
                id: article.id.clone(),
                reason: "missing title",
            });
        }
        let body = article.body();
        if body.trim().is_empty() {
            return Err(ClassifyError::InvalidArticle {
                id: article.id.clone(),
                reason: "missing content and summary",
            });
        }
        Ok(ClassificationRequest::new(
            &article.title,
            truncate_chars(body, self.prefix_chars),
            &self.categories,
            self.min_relevance,
        ))
    }

    pub async fn classify_article(&self, article: &Article) -> Result<CategoryScores, ClassifyError> {
        let req = self.build_request(article)?;
        let raw = self.service.classify(&req).await?;
        let scores = self.retain_relevant(raw);
        if scores.is_empty() {
            return Err(ClassifyError::NoQualifyingCategory(self.min_relevance));
        }
        Ok(scores)
    }

    /// Clamp to `[0, 100]`, drop ids outside the taxonomy and anything at or below the threshold.
    pub fn retain_relevant(&self, raw: RawScores) -> CategoryScores {
        let mut out = CategoryScores::new();
        for (id, score) in raw {
            if !self.categories.contains(&id) {
                tracing::debug!(target: "classify", category = %id, "dropping unknown category");
                continue;
            }
            let score = score.clamp(0.0, 100.0);
            if score > self.min_relevance {
                out.insert(id, score);
            }
        }
        out
    }
}
