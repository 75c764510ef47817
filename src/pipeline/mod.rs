//! Job orchestration.
//!
//! Daily:  Fetch → Process → Classify → Persist
//! Weekly: Load → Rank → Generate → Persist
//! Discover: Validate
//!
//! Each run works on the `ConfigSnapshot` it was built with, persists only in
//! its final stage, and reports through `RunResult` instead of returning errors.
//! Cancellation is checked before every stage and inside the fetch/classify
//! fan-outs. A second run for a key that is still in flight is rejected, via a
//! lock held in storage so separate processes see it too.

pub mod result;

pub use result::{Job, RunResult, RunStatus, Stage, StageError};

use chrono::{NaiveDate, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::load_week;
use crate::cancel::CancellationToken;
use crate::classify::{BatchCoordinator, Classifier, DynClassificationService};
use crate::config::ConfigSnapshot;
use crate::curate::ListGenerator;
use crate::ingest::discovery::discover_and_validate;
use crate::ingest::types::{FeedOutcome, FeedSource};
use crate::ingest::{fetch_all, process_batch};
use crate::model::{DailyRecord, WeeklyCuration};
use crate::rank::Ranker;
use crate::storage::{daily_key, save_json, weekly_key, KeyLock, Storage};
use crate::week::WeekId;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Job runs by job and status.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix time of the last finished run per job."
        );
        describe_counter!("curate_ranked_total", "RankedArticle entries produced.");
    });
}

/// Claims `key` in storage for the length of a run, so a second trigger
/// (in this process or another) is turned away instead of racing.
async fn claim(storage: &dyn Storage, key: &str, result: &RunResult) -> Result<KeyLock, RunResult> {
    match storage.try_lock(key).await {
        Ok(Some(lock)) => Ok(lock),
        Ok(None) => Err(record(result.clone().rejected("run already in progress"))),
        Err(e) => Err(record(result.clone().rejected(&format!("cannot claim run: {e:#}")))),
    }
}

fn gate(cancel: &CancellationToken, stage: Stage) -> Result<(), StageError> {
    if cancel.is_cancelled() {
        tracing::warn!(target: "pipeline", %stage, "run cancelled before stage");
        return Err(StageError::cancelled(stage));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<ConfigSnapshot>,
    source: Arc<dyn FeedSource>,
    coordinator: Arc<BatchCoordinator>,
    storage: Arc<dyn Storage>,
}

impl Pipeline {
    pub fn new(
        config: Arc<ConfigSnapshot>,
        source: Arc<dyn FeedSource>,
        service: DynClassificationService,
        storage: Arc<dyn Storage>,
    ) -> Self {
        ensure_metrics_described();
        let classifier = Classifier::new(
            service,
            Arc::new(config.categories.clone()),
            &config.settings.classify,
        );
        let coordinator = BatchCoordinator::new(Arc::new(classifier), &config.settings.classify);
        Self {
            config,
            source,
            coordinator: Arc::new(coordinator),
            storage,
        }
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub async fn run_daily_ingestion(&self, date: Option<NaiveDate>) -> RunResult {
        self.run_daily_ingestion_with(date, &CancellationToken::new())
            .await
    }

    pub async fn run_daily_ingestion_with(
        &self,
        date: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> RunResult {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let key = daily_key(date);
        let result = RunResult::start(Job::Daily, date.to_string());
        let _lock = match claim(self.storage.as_ref(), &key, &result).await {
            Ok(lock) => lock,
            Err(rejected) => return rejected,
        };
        tracing::info!(target: "pipeline", %date, "daily ingestion started");

        let mut result = result;
        let outcome = self.daily_stages(date, &key, cancel, &mut result).await;
        record(result.finish(outcome))
    }

    async fn daily_stages(
        &self,
        date: NaiveDate,
        key: &str,
        cancel: &CancellationToken,
        result: &mut RunResult,
    ) -> Result<(), StageError> {
        let settings = &self.config.settings;

        gate(cancel, Stage::Fetch)?;
        let fetched = fetch_all(
            self.source.as_ref(),
            &self.config.feeds,
            Duration::from_secs(settings.fetch.timeout_secs.max(1)),
            cancel,
        )
        .await
        .map_err(|_| StageError::cancelled(Stage::Fetch))?;
        result.count("feeds_checked", fetched.outcomes.len());
        result.count("feeds_failed", fetched.feeds_failed());
        result.count("entries_fetched", fetched.articles.len());
        let failures: Vec<_> = fetched
            .outcomes
            .iter()
            .filter_map(|o| match o {
                FeedOutcome::Failed { feed_id, error } => Some(json!({ "feed": feed_id, "error": error })),
                FeedOutcome::Fetched { .. } => None,
            })
            .collect();
        if !failures.is_empty() {
            result.detail("feed_failures", json!(failures));
        }

        gate(cancel, Stage::Process)?;
        let processed = process_batch(fetched.articles, Utc::now());
        result.count("articles_processed", processed.articles.len());
        result.count("entries_dropped", processed.dropped_empty);
        result.count("duplicates", processed.duplicates);

        gate(cancel, Stage::Classify)?;
        let batch = self
            .coordinator
            .classify_batch_cancellable(processed.articles, cancel)
            .await
            .map_err(|_| StageError::cancelled(Stage::Classify))?;
        result.count("articles_classified", batch.scored());
        result.count("classification_fallbacks", batch.fallbacks());

        gate(cancel, Stage::Persist)?;
        let record = DailyRecord {
            date,
            generated_at: Utc::now(),
            articles: batch.articles,
        };
        save_json(self.storage.as_ref(), key, &record)
            .await
            .map_err(|e| StageError::from_anyhow(Stage::Persist, e))?;
        tracing::info!(target: "pipeline", key, articles = record.articles.len(), "daily record persisted");
        Ok(())
    }

    pub async fn run_weekly_curation(&self, week: Option<WeekId>) -> RunResult {
        self.run_weekly_curation_with(week, &CancellationToken::new())
            .await
    }

    pub async fn run_weekly_curation_with(
        &self,
        week: Option<WeekId>,
        cancel: &CancellationToken,
    ) -> RunResult {
        let week = week.unwrap_or_else(WeekId::current);
        let key = weekly_key(week);
        let result = RunResult::start(Job::Weekly, week.to_string());
        let _lock = match claim(self.storage.as_ref(), &key, &result).await {
            Ok(lock) => lock,
            Err(rejected) => return rejected,
        };
        tracing::info!(target: "pipeline", %week, "weekly curation started");

        let mut result = result;
        let outcome = self.weekly_stages(week, &key, cancel, &mut result).await;
        record(result.finish(outcome))
    }

    async fn weekly_stages(
        &self,
        week: WeekId,
        key: &str,
        cancel: &CancellationToken,
        result: &mut RunResult,
    ) -> Result<(), StageError> {
        gate(cancel, Stage::Load)?;
        let loaded = load_week(self.storage.as_ref(), week)
            .await
            .map_err(|e| StageError::from_anyhow(Stage::Load, e))?;
        result.count("days_found", loaded.days_found);
        result.count("articles_loaded", loaded.articles.len());

        gate(cancel, Stage::Rank)?;
        let ranked_at = Utc::now().min(week.end());
        let ranked = Ranker::new(&self.config, ranked_at).rank_articles(&loaded.articles);
        result.count("articles_ranked", ranked.len());

        gate(cancel, Stage::Generate)?;
        let generator = ListGenerator::new(
            self.config.categories.clone(),
            self.config.settings.curation.max_list_size,
        );
        let lists = generator.generate_weekly_lists(ranked);
        result.count("categories", lists.len());
        result.count("articles_listed", lists.values().map(|l| l.len()).sum());
        result.detail(
            "list_sizes",
            json!(lists
                .iter()
                .map(|(id, l)| (id.clone(), l.len()))
                .collect::<std::collections::BTreeMap<_, _>>()),
        );

        gate(cancel, Stage::Persist)?;
        let curation = WeeklyCuration {
            week,
            generated_at: Utc::now(),
            ranked_at,
            articles_considered: loaded.articles.len(),
            lists,
        };
        save_json(self.storage.as_ref(), key, &curation)
            .await
            .map_err(|e| StageError::from_anyhow(Stage::Persist, e))?;
        tracing::info!(target: "pipeline", key, "weekly curation persisted");
        Ok(())
    }

    pub async fn discover_new_feeds(&self) -> RunResult {
        self.discover_new_feeds_with(&CancellationToken::new()).await
    }

    /// Validates configured candidates; proposals are reported, not persisted.
    pub async fn discover_new_feeds_with(&self, cancel: &CancellationToken) -> RunResult {
        let result = RunResult::start(Job::Discover, "discovery");
        let _lock = match claim(self.storage.as_ref(), "discovery", &result).await {
            Ok(lock) => lock,
            Err(rejected) => return rejected,
        };

        let mut result = result;
        let outcome = async {
            gate(cancel, Stage::Validate)?;
            let report = discover_and_validate(
                self.source.as_ref(),
                &self.config.settings.discovery.candidates,
                &self.config.feeds,
                Duration::from_secs(self.config.settings.fetch.timeout_secs.max(1)),
                cancel,
            )
            .await
            .map_err(|_| StageError::cancelled(Stage::Validate))?;
            result.count("discovered", report.discovered);
            result.count("skipped_known", report.skipped_known);
            result.count("validated", report.validated.len());
            result.count("rejected", report.rejected.len());
            result.detail("validated", json!(report.validated));
            result.detail(
                "rejected",
                json!(report
                    .rejected
                    .iter()
                    .map(|(url, reason)| json!({ "url": url, "reason": reason }))
                    .collect::<Vec<_>>()),
            );
            Ok::<(), StageError>(())
        }
        .await;
        record(result.finish(outcome))
    }
}

fn record(result: RunResult) -> RunResult {
    let job = result.job.as_str();
    let status = if result.is_success() { "success" } else { "error" };
    counter!("pipeline_runs_total", "job" => job, "status" => status).increment(1);
    gauge!("pipeline_last_run_ts", "job" => job).set(result.finished_at.timestamp() as f64);
    match &result.error {
        None => tracing::info!(target: "pipeline", job, key = %result.key, counts = ?result.counts, "run finished"),
        Some(e) => tracing::error!(target: "pipeline", job, key = %result.key, stage = ?result.failed_stage, error = %e, "run failed"),
    }
    result
}
