//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__TOP_K=8`). Relative paths
//! are resolved against the directory the config files were loaded from.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Wraps an already assembled figment; used by tests and embedders.
    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }

    pub fn base_dir(&self) -> &Path { &self.base_dir }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub lookup: LookupSettings,
    pub planner: PlannerSettings,
    pub orchestrator: OrchestratorSettings,
    pub aggregator: AggregatorSettings,
    pub generation: GenerationSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let idx = &self.index;
        if idx.ngram_min == 0 || idx.ngram_min > idx.ngram_max {
            return Err(Error::InvalidConfig(format!("index.ngram range {}..={} is empty", idx.ngram_min, idx.ngram_max)));
        }
        if !(idx.max_df > 0.0 && idx.max_df <= 1.0) {
            return Err(Error::InvalidConfig(format!("index.max_df must be in (0, 1], got {}", idx.max_df)));
        }
        if idx.max_features == 0 { return Err(Error::InvalidConfig("index.max_features must be > 0".into())); }
        if self.retrieval.top_k == 0 { return Err(Error::InvalidConfig("retrieval.top_k must be > 0".into())); }
        if self.lookup.top_k == 0 { return Err(Error::InvalidConfig("lookup.top_k must be > 0".into())); }
        if !(0.0..=100.0).contains(&self.lookup.min_score) {
            return Err(Error::InvalidConfig(format!("lookup.min_score must be in [0, 100], got {}", self.lookup.min_score)));
        }
        if self.planner.source_a_workers + self.planner.source_b_workers == 0 {
            return Err(Error::InvalidConfig("planner needs at least one worker".into()));
        }
        if self.orchestrator.worker_timeout_secs == 0 {
            return Err(Error::InvalidConfig("orchestrator.worker_timeout_secs must be > 0".into()));
        }
        for (key, t) in [("orchestrator.temperature", self.orchestrator.temperature), ("aggregator.temperature", self.aggregator.temperature)] {
            if !(0.0..=2.0).contains(&t) { return Err(Error::InvalidConfig(format!("{key} must be in [0, 2], got {t}"))); }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataSettings {
    pub rulings_path: String,
    pub precedents_path: String,
    pub cache_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            rulings_path: "data/data_kcs.json".to_string(),
            precedents_path: "data/data_moleg.json".to_string(),
            cache_path: "data/index_cache.bin.zst".to_string(),
        }
    }
}

impl DataSettings {
    pub fn rulings(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.rulings_path) }
    pub fn precedents(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.precedents_path) }
    pub fn cache(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.cache_path) }
}

/// How source files are summarized into a cache fingerprint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// File size + modification time.
    #[default]
    Metadata,
    /// Full file contents.
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub max_features: usize,
    pub max_df: f64,
    pub min_df: usize,
    pub fingerprint: FingerprintMode,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { ngram_min: 2, ngram_max: 4, max_features: 50_000, max_df: 0.9, min_df: 1, fingerprint: FingerprintMode::Metadata }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: 5 } }
}

/// Identifier lookup (`caselaw lookup`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LookupSettings {
    pub top_k: usize,
    /// Records scoring below this (0..=100) are dropped.
    pub min_score: f64,
}

impl Default for LookupSettings {
    fn default() -> Self { Self { top_k: 20, min_score: 30.0 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerSettings {
    pub source_a_workers: usize,
    pub source_b_workers: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self { Self { source_a_workers: 2, source_b_workers: 4 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub temperature: f32,
    pub worker_timeout_secs: u64,
    pub max_context_turns: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self { Self { temperature: 0.1, worker_timeout_secs: 60, max_context_turns: 5 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregatorSettings {
    pub temperature: f32,
    pub max_input_tokens: usize,
    pub cooldown_ms: u64,
}

impl Default for AggregatorSettings {
    fn default() -> Self { Self { temperature: 0.1, max_input_tokens: 200_000, cooldown_ms: 0 } }
}

/// Remote generation endpoint used by the CLI (OpenAI-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "CASELAW_API_KEY".to_string(),
            request_timeout_secs: 120,
        }
    }
}
