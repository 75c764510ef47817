//! Batch classification: fallback guarantee, ordering, and thresholding.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use devblog_curator::categories::CategoryRegistry;
use devblog_curator::classify::ai_adapter::ClassifyFuture;
use devblog_curator::classify::{
    BatchCoordinator, ClassificationRequest, ClassificationService, Classifier, ClassifyError,
    ItemOutcome, RawScores,
};
use devblog_curator::config::settings::ClassifySettings;
use devblog_curator::model::Article;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Fails for titles in `failing`; otherwise returns `reply`.
struct Scripted {
    failing: HashSet<String>,
    reply: RawScores,
}

impl ClassificationService for Scripted {
    fn classify<'a>(&'a self, req: &'a ClassificationRequest) -> ClassifyFuture<'a> {
        let fail = self.failing.contains(&req.title);
        let reply = self.reply.clone();
        Box::pin(async move {
            if fail {
                Err(ClassifyError::Unavailable("simulated outage".into()))
            } else {
                Ok(reply)
            }
        })
    }
    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn article(n: usize) -> Article {
    Article {
        id: format!("post-{n:03}"),
        title: format!("Post {n}"),
        url: format!("https://blog.test/{n}"),
        summary: "A post about distributed systems.".into(),
        content: None,
        author: None,
        published_date: Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap(),
        source_feed: "blog".into(),
        tags: Default::default(),
        category_scores: Default::default(),
        classification_timestamp: None,
        classification_error: None,
    }
}

fn settings() -> ClassifySettings {
    ClassifySettings {
        concurrency: 4,
        requests_per_minute: 0,
        ..ClassifySettings::default()
    }
}

fn coordinator(failing: HashSet<String>, reply: &[(&str, f64)]) -> BatchCoordinator {
    let svc = Arc::new(Scripted {
        failing,
        reply: reply.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    });
    let s = settings();
    let classifier = Classifier::new(svc, Arc::new(CategoryRegistry::default_seed()), &s);
    BatchCoordinator::new(Arc::new(classifier), &s)
}

#[tokio::test]
async fn one_failure_in_five_is_isolated() {
    let failing: HashSet<String> = ["Post 2".to_string()].into();
    let c = coordinator(failing, &[("system_design", 70.0)]);
    let input: Vec<Article> = (0..5).map(article).collect();

    let out = c.classify_batch(input).await;
    assert_eq!(out.articles.len(), 5);
    assert_eq!(out.fallbacks(), 1);

    for (i, a) in out.articles.iter().enumerate() {
        assert_eq!(a.id, format!("post-{i:03}"));
        assert!(a.classification_timestamp.is_some());
        if i == 2 {
            assert_eq!(a.category_scores.len(), 1);
            assert_eq!(a.category_scores.get("technical_excellence"), Some(&50.0));
            assert!(a
                .classification_error
                .as_deref()
                .unwrap()
                .contains("simulated outage"));
            assert!(matches!(out.outcomes[i], ItemOutcome::Fallback { .. }));
        } else {
            assert_eq!(a.category_scores.get("system_design"), Some(&70.0));
            assert!(a.classification_error.is_none());
            assert!(matches!(out.outcomes[i], ItemOutcome::Scored { .. }));
        }
    }
}

#[tokio::test]
async fn random_failures_never_drop_or_reorder() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..20 {
        let n = rng.random_range(0..40);
        let failing: HashSet<String> = (0..n)
            .filter(|_| rng.random_bool(0.35))
            .map(|i| format!("Post {i}"))
            .collect();
        let expected_failures = failing.len();
        let c = coordinator(failing, &[("ai_ml", 33.0), ("security", 12.5)]);
        let input: Vec<Article> = (0..n).map(article).collect();
        let ids: Vec<String> = input.iter().map(|a| a.id.clone()).collect();

        let out = c.classify_batch(input).await;
        let got: Vec<String> = out.articles.iter().map(|a| a.id.clone()).collect();
        assert_eq!(got, ids, "round {round}");
        assert_eq!(out.fallbacks(), expected_failures, "round {round}");
        assert!(out.articles.iter().all(|a| !a.category_scores.is_empty()));
        assert!(out
            .articles
            .iter()
            .all(|a| a.classification_timestamp.is_some()));
    }
}

#[tokio::test]
async fn scores_at_or_below_threshold_are_absent() {
    let c = coordinator(HashSet::new(), &[("security", 8.0), ("system_design", 45.0)]);
    let out = c.classify_batch(vec![article(1)]).await;
    let scores = &out.articles[0].category_scores;
    assert_eq!(scores.len(), 1);
    assert_eq!(scores.get("system_design"), Some(&45.0));
    assert!(!scores.contains_key("security"));
}

#[tokio::test]
async fn all_below_threshold_falls_back_with_annotation() {
    let c = coordinator(HashSet::new(), &[("security", 4.0)]);
    let out = c.classify_batch(vec![article(1)]).await;
    let a = &out.articles[0];
    assert_eq!(a.category_scores.get("technical_excellence"), Some(&50.0));
    assert!(a.classification_error.is_some());
}

#[tokio::test]
async fn empty_batch_is_fine() {
    let c = coordinator(HashSet::new(), &[]);
    let out = c.classify_batch(vec![]).await;
    assert!(out.articles.is_empty());
    assert!(out.outcomes.is_empty());
}
