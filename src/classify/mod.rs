// src/classify/mod.rs
pub mod ai_adapter;
pub mod batch;
pub mod classifier;
pub mod prompt;

pub use ai_adapter::{
    build_service_from_config, CachingService, ClassificationService, DisabledService,
    DynClassificationService, KeywordMockProvider, OpenAiProvider, Provider,
};
pub use batch::{BatchCoordinator, BatchResult, ItemOutcome};
pub use classifier::Classifier;
pub use prompt::{ClassificationRequest, RawScores};

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification service unavailable: {0}")]
    Unavailable(String),
    #[error("classification timed out after {0}s")]
    Timeout(u64),
    #[error("unparseable classification response: {0}")]
    Unparseable(String),
    #[error("invalid article '{id}': {reason}")]
    InvalidArticle { id: String, reason: &'static str },
    #[error("daily classification limit reached ({0})")]
    LimitReached(u32),
    #[error("no category scored above {0}")]
    NoQualifyingCategory(f64),
}

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classify_requests_total", "Articles sent for classification.");
        describe_counter!(
            "classify_fallback_total",
            "Articles that received the fallback mapping."
        );
        describe_histogram!(
            "classify_latency_ms",
            "Per-article classification time in milliseconds."
        );
    });
}
