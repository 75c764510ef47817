use std::{env, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_daily_limit() -> u32 {
    500
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

/// Contents of `ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Real provider calls per day; cache hits are free.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            api_key: String::new(),
            endpoint: default_endpoint(),
        }
    }
}

impl AiConfig {
    /// Reads `ai.json`. The provider name is lowercased; an `api_key` of
    /// `"ENV"` is replaced with the provider's environment variable.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut cfg: AiConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;

        cfg.provider = cfg.provider.trim().to_lowercase();
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = cfg.key_from_env()?;
        }
        if cfg.daily_limit == 0 {
            cfg.daily_limit = default_daily_limit();
        }
        Ok(cfg)
    }

    fn key_from_env(&self) -> anyhow::Result<String> {
        match self.provider.as_str() {
            "mock" => Ok(String::new()),
            "openai" => env::var(OPENAI_KEY_VAR)
                .with_context(|| format!("{OPENAI_KEY_VAR} is not set but ai.json asks for it")),
            other => anyhow::bail!("no key variable known for AI provider '{other}'"),
        }
    }

    /// Missing file: AI disabled (every classification falls back).
    /// A present but malformed file is still an error.
    pub fn load_or_disabled<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        match path.as_ref().try_exists()? {
            true => Self::load_from_file(path),
            false => Ok(Self::default()),
        }
    }
}
