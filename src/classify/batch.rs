//! Batch classification: bounded concurrency, pacing, per-item timeout, fallback.
//!
//! Every input article comes back, in input order, with a timestamp and a
//! non-empty `category_scores`. A failed item carries the fallback mapping and
//! its error string; the per-item `ItemOutcome` makes the split visible to callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::Mutex;

use super::classifier::Classifier;
use super::ClassifyError;
use crate::cancel::{CancellationToken, Cancelled};
use crate::config::settings::ClassifySettings;
use crate::model::{Article, CategoryScores};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Scored { article_id: String },
    Fallback { article_id: String, error: String },
}

impl ItemOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ItemOutcome::Fallback { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub articles: Vec<Article>,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    pub fn scored(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_fallback()).count()
    }

    pub fn fallbacks(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fallback()).count()
    }
}

/// Spaces request starts evenly to stay under a requests-per-minute budget.
struct Pacer {
    interval: Duration,
    next: Mutex<tokio::time::Instant>,
}

impl Pacer {
    fn per_minute(rpm: u32) -> Option<Self> {
        if rpm == 0 {
            return None;
        }
        Some(Self {
            interval: Duration::from_secs(60) / rpm,
            next: Mutex::new(tokio::time::Instant::now()),
        })
    }

    async fn wait(&self) {
        let start = {
            let mut next = self.next.lock().await;
            let start = (*next).max(tokio::time::Instant::now());
            *next = start + self.interval;
            start
        };
        tokio::time::sleep_until(start).await;
    }
}

pub struct BatchCoordinator {
    classifier: Arc<Classifier>,
    concurrency: usize,
    timeout: Duration,
    pacer: Option<Pacer>,
    fallback: CategoryScores,
}

impl BatchCoordinator {
    pub fn new(classifier: Arc<Classifier>, settings: &ClassifySettings) -> Self {
        super::ensure_metrics_described();
        let mut fallback = CategoryScores::new();
        fallback.insert(
            settings.fallback_category.clone(),
            settings.fallback_score.clamp(0.0, 100.0),
        );
        Self {
            classifier,
            concurrency: settings.concurrency.max(1),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            pacer: Pacer::per_minute(settings.requests_per_minute),
            fallback,
        }
    }

    pub fn fallback_mapping(&self) -> &CategoryScores {
        &self.fallback
    }

    /// Classify all articles; never drops or reorders items.
    pub async fn classify_batch(&self, articles: Vec<Article>) -> BatchResult {
        let results: Vec<(Article, ItemOutcome)> = stream::iter(articles)
            .map(|a| self.classify_one(a))
            .buffered(self.concurrency)
            .collect()
            .await;
        let mut out = BatchResult::default();
        for (article, outcome) in results {
            out.articles.push(article);
            out.outcomes.push(outcome);
        }
        tracing::info!(
            target: "classify",
            provider = self.classifier.provider_name(),
            total = out.articles.len(),
            fallbacks = out.fallbacks(),
            "batch classified"
        );
        out
    }

    /// Like `classify_batch`, but drops all pending requests when `cancel` fires.
    pub async fn classify_batch_cancellable(
        &self,
        articles: Vec<Article>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, Cancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            r = self.classify_batch(articles) => Ok(r),
        }
    }

    async fn classify_one(&self, mut article: Article) -> (Article, ItemOutcome) {
        if let Some(p) = &self.pacer {
            p.wait().await;
        }
        counter!("classify_requests_total").increment(1);
        let called_at = Utc::now();
        let t0 = Instant::now();

        let res = match tokio::time::timeout(self.timeout, self.classifier.classify_article(&article)).await {
            Ok(r) => r,
            Err(_) => Err(ClassifyError::Timeout(self.timeout.as_secs())),
        };
        histogram!("classify_latency_ms").record(t0.elapsed().as_millis() as f64);

        article.classification_timestamp = Some(called_at);
        let outcome = match res {
            Ok(scores) => {
                article.category_scores = scores;
                article.classification_error = None;
                ItemOutcome::Scored {
                    article_id: article.id.clone(),
                }
            }
            Err(e) => {
                counter!("classify_fallback_total").increment(1);
                tracing::warn!(target: "classify", article = %article.id, error = %e, "classification failed; fallback applied");
                let error = e.to_string();
                article.category_scores = self.fallback.clone();
                article.classification_error = Some(error.clone());
                ItemOutcome::Fallback {
                    article_id: article.id.clone(),
                    error,
                }
            }
        };
        (article, outcome)
    }
}
