// src/pipeline/result.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    Daily,
    Weekly,
    Discover,
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::Daily => "daily",
            Job::Weekly => "weekly",
            Job::Discover => "discover",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Stages of the daily (Fetch → Process → Classify → Persist), weekly
/// (Load → Rank → Generate → Persist) and discovery (Validate) jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Process,
    Classify,
    Load,
    Rank,
    Generate,
    Validate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Process => "process",
            Stage::Classify => "classify",
            Stage::Load => "load",
            Stage::Rank => "rank",
            Stage::Generate => "generate",
            Stage::Validate => "validate",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {detail}")]
pub struct StageError {
    pub stage: Stage,
    pub detail: String,
}

impl StageError {
    pub fn new(stage: Stage, err: impl fmt::Display) -> Self {
        Self {
            stage,
            detail: err.to_string(),
        }
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(stage, "cancelled")
    }

    /// Wrap an `anyhow` chain keeping every context layer.
    pub fn from_anyhow(stage: Stage, err: anyhow::Error) -> Self {
        Self::new(stage, format!("{err:#}"))
    }
}

/// Structured outcome of one job run. Always produced, never thrown.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub job: Job,
    pub status: RunStatus,
    /// Date (`YYYY-MM-DD`), week (`YYYY-Www`) or `discovery`.
    pub key: String,
    pub counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub(crate) fn start(job: Job, key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job,
            status: RunStatus::Success,
            key: key.into(),
            counts: BTreeMap::new(),
            details: serde_json::Value::Null,
            failed_stage: None,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn count(&mut self, name: &str, value: usize) {
        self.counts.insert(name.to_string(), value as u64);
    }

    pub(crate) fn detail(&mut self, name: &str, value: serde_json::Value) {
        if !self.details.is_object() {
            self.details = serde_json::Value::Object(Default::default());
        }
        if let Some(obj) = self.details.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
    }

    pub(crate) fn finish(mut self, outcome: Result<(), StageError>) -> Self {
        if let Err(e) = outcome {
            self.status = RunStatus::Error;
            self.failed_stage = Some(e.stage);
            self.error = Some(e.detail);
        }
        self.finished_at = Utc::now();
        self
    }

    pub(crate) fn rejected(mut self, reason: &str) -> Self {
        self.status = RunStatus::Error;
        self.error = Some(reason.to_string());
        self.finished_at = Utc::now();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Error => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_is_captured() {
        let r = RunResult::start(Job::Daily, "2026-10-14")
            .finish(Err(StageError::new(Stage::Persist, "disk full")));
        assert_eq!(r.status, RunStatus::Error);
        assert_eq!(r.failed_stage, Some(Stage::Persist));
        assert_eq!(r.exit_code(), 1);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["failed_stage"], "persist");
        assert_eq!(json["job"], "daily");
    }

    #[test]
    fn success_has_zero_exit_code_and_no_error_fields() {
        let mut r = RunResult::start(Job::Weekly, "2026-W42");
        r.count("articles_loaded", 3);
        let r = r.finish(Ok(()));
        assert_eq!(r.exit_code(), 0);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["counts"]["articles_loaded"], 3);
    }
}
