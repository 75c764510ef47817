//! Classification backends: the remote provider, a keyword mock, and the
//! caching wrapper that enforces the daily call quota.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::prompt::{build_prompt, parse_scores, ClassificationRequest, RawScores, SYSTEM_PROMPT};
use super::ClassifyError;
use crate::config::ai::AiConfig;

pub type ClassifyFuture<'a> = Pin<Box<dyn Future<Output = Result<RawScores, ClassifyError>> + Send + 'a>>;

// ==== service boundary ====

/// Service boundary used by the classifier.
pub trait ClassificationService: Send + Sync {
    fn classify<'a>(&'a self, req: &'a ClassificationRequest) -> ClassifyFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynClassificationService = Arc<dyn ClassificationService>;

/// Factory: build a service according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock` (or `provider = "mock"`), returns the keyword mock.
/// * Else if `config.enabled == false`, returns a disabled service (every call fails → fallback).
/// * Else builds the OpenAI provider wrapped with caching + daily limit,
///   each request bounded by `timeout_secs`.
pub fn build_service_from_config(
    config: &AiConfig,
    cache_dir: &Path,
    timeout_secs: u64,
) -> anyhow::Result<DynClassificationService> {
    let mock_mode = std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false);

    if mock_mode || (config.enabled && config.provider == "mock") {
        let client = CachingService::new(KeywordMockProvider, cache_dir.to_path_buf(), config.daily_limit);
        return Ok(Arc::new(client));
    }

    if !config.enabled {
        return Ok(Arc::new(DisabledService));
    }

    match config.provider.as_str() {
        "openai" => {
            let provider = OpenAiProvider::new(config, timeout_secs)?;
            Ok(Arc::new(CachingService::new(
                provider,
                cache_dir.to_path_buf(),
                config.daily_limit,
            )))
        }
        other => anyhow::bail!("unsupported AI provider '{other}'"),
    }
}

// ==== providers ====

/// Low-level provider: does the *real* remote call. Separated so the same
/// caching wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, req: &'a ClassificationRequest) -> ClassifyFuture<'a>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions API, JSON reply).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(cfg: &AiConfig, timeout_secs: u64) -> anyhow::Result<Self> {
        let timeout_secs = timeout_secs.max(1);
        let http = reqwest::Client::builder()
            .user_agent("devblog-curator/0.1")
            .connect_timeout(Duration::from_secs(5).min(Duration::from_secs(timeout_secs)))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: cfg.endpoint.clone(),
            timeout_secs,
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, req: &'a ClassificationRequest) -> ClassifyFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(ClassifyError::Unavailable("missing API key".to_string()));
            }

            #[derive(Serialize)]
            struct Msg<'m> {
                role: &'m str,
                content: &'m str,
            }
            #[derive(Serialize)]
            struct ResponseFormat {
                r#type: &'static str,
            }
            #[derive(Serialize)]
            struct Req<'m> {
                model: &'m str,
                messages: Vec<Msg<'m>>,
                temperature: f32,
                max_tokens: u32,
                response_format: ResponseFormat,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let user = build_prompt(req);
            let body = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Msg {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: 0.0,
                max_tokens: 300,
                response_format: ResponseFormat {
                    r#type: "json_object",
                },
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ClassifyError::Timeout(self.timeout_secs)
                    } else {
                        ClassifyError::Unavailable(e.to_string())
                    }
                })?;

            let status = resp.status();
            if !status.is_success() {
                return Err(ClassifyError::Unavailable(format!("provider returned {status}")));
            }
            let parsed: Resp = resp
                .json()
                .await
                .map_err(|e| ClassifyError::Unparseable(e.to_string()))?;
            let content = parsed
                .choices
                .first()
                .map(|c| c.message.content.as_str())
                .unwrap_or("");
            parse_scores(content)
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with `Unavailable`; used when AI is disabled.
pub struct DisabledService;

impl ClassificationService for DisabledService {
    fn classify<'a>(&'a self, _req: &'a ClassificationRequest) -> ClassifyFuture<'a> {
        Box::pin(async { Err(ClassifyError::Unavailable("AI classification disabled".to_string())) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic offline provider: scores each category by keyword hits
/// (title hits count double). Used for tests and `AI_TEST_MODE=mock`.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordMockProvider;

impl KeywordMockProvider {
    pub fn score(req: &ClassificationRequest) -> RawScores {
        let title = req.title.to_lowercase();
        let body = req.content.to_lowercase();
        let mut out = RawScores::new();
        for c in &req.categories {
            let mut hits = 0usize;
            for kw in &c.keywords {
                let kw = kw.to_lowercase();
                if kw.is_empty() {
                    continue;
                }
                hits += 2 * title.matches(kw.as_str()).count();
                hits += body.matches(kw.as_str()).count();
            }
            if hits > 0 {
                out.insert(c.id.clone(), (15.0 * hits as f64).min(100.0));
            }
        }
        out
    }
}

impl Provider for KeywordMockProvider {
    fn fetch<'a>(&'a self, req: &'a ClassificationRequest) -> ClassifyFuture<'a> {
        let out = Self::score(req);
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ==== caching wrapper ====

/// Wraps a provider with an on-disk response cache and a per-day call quota.
pub struct CachingService<P: Provider> {
    inner: P,
    cache: ResponseCache,
    quota: Mutex<CallQuota>,
}

impl<P: Provider> CachingService<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(dir = %cache_dir.display(), error = %e, "ai cache dir unavailable");
        }
        let quota = CallQuota::restore(cache_dir.join(QUOTA_FILE), daily_limit);
        Self {
            inner,
            cache: ResponseCache { root: cache_dir },
            quota: Mutex::new(quota),
        }
    }

    /// Real provider calls made today (cache hits excluded).
    pub fn calls_today(&self) -> u32 {
        self.with_quota(|q| {
            q.roll_over();
            q.used
        })
    }

    fn with_quota<T>(&self, f: impl FnOnce(&mut CallQuota) -> T) -> T {
        let mut q = self.quota.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut q)
    }

    async fn classify_impl(&self, req: &ClassificationRequest) -> Result<RawScores, ClassifyError> {
        let key = ResponseCache::key_for(req);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(target: "classify", key = %key, "ai cache hit");
            return Ok(hit);
        }

        // Slot is taken before the await so parallel callers cannot overshoot.
        self.with_quota(CallQuota::take)?;

        let outcome = self.inner.fetch(req).await;
        match &outcome {
            Ok(fresh) => {
                if let Err(e) = self.cache.put(&key, fresh) {
                    tracing::warn!(target: "classify", error = %e, "ai cache write failed");
                }
            }
            Err(_) => self.with_quota(CallQuota::give_back),
        }
        outcome
    }
}

impl<P: Provider> ClassificationService for CachingService<P> {
    fn classify<'a>(&'a self, req: &'a ClassificationRequest) -> ClassifyFuture<'a> {
        Box::pin(self.classify_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ==== response cache ====

struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    /// First 16 bytes of the request's SHA-256, hex encoded.
    fn key_for(req: &ClassificationRequest) -> String {
        let digest = Sha256::digest(serde_json::to_vec(req).unwrap_or_default());
        digest[..16].iter().map(|b| format!("{b:02x}")).collect()
    }

    fn entry(&self, key: &str) -> PathBuf {
        self.root.join(key).with_extension("json")
    }

    fn get(&self, key: &str) -> Option<RawScores> {
        let raw = fs::read(self.entry(key)).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    fn put(&self, key: &str, scores: &RawScores) -> io::Result<()> {
        let body = serde_json::to_vec(scores).map_err(io::Error::other)?;
        replace_file(&self.entry(key), &body)
    }
}

/// Writes next to `target` and renames over it.
fn replace_file(target: &Path, body: &[u8]) -> io::Result<()> {
    let staging = target.with_extension("partial");
    {
        let mut out = fs::File::create(&staging)?;
        out.write_all(body)?;
        out.sync_all()?;
    }
    fs::rename(&staging, target)
}

// ==== daily quota ====

const QUOTA_FILE: &str = "quota.json";

#[derive(Debug, Serialize, Deserialize)]
struct QuotaState {
    day: chrono::NaiveDate,
    used: u32,
}

struct CallQuota {
    file: PathBuf,
    limit: u32,
    day: chrono::NaiveDate,
    used: u32,
}

impl CallQuota {
    fn restore(file: PathBuf, limit: u32) -> Self {
        let today = chrono::Utc::now().date_naive();
        let saved = fs::read(&file)
            .ok()
            .and_then(|raw| serde_json::from_slice::<QuotaState>(&raw).ok())
            .filter(|s| s.day == today);
        Self {
            file,
            limit,
            day: today,
            used: saved.map_or(0, |s| s.used),
        }
    }

    fn roll_over(&mut self) {
        let today = chrono::Utc::now().date_naive();
        if self.day != today {
            self.day = today;
            self.used = 0;
        }
    }

    fn take(&mut self) -> Result<(), ClassifyError> {
        self.roll_over();
        if self.used >= self.limit {
            return Err(ClassifyError::LimitReached(self.limit));
        }
        self.used += 1;
        self.persist();
        Ok(())
    }

    fn give_back(&mut self) {
        self.used = self.used.saturating_sub(1);
        self.persist();
    }

    fn persist(&self) {
        let state = QuotaState {
            day: self.day,
            used: self.used,
        };
        let written = serde_json::to_vec(&state)
            .map_err(io::Error::other)
            .and_then(|body| replace_file(&self.file, &body));
        if let Err(e) = written {
            tracing::warn!(target: "classify", error = %e, "quota state not saved");
        }
    }
}
