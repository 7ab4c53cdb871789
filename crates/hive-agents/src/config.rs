//! Run configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags, applied with [`HiveConfig::with_overrides`]
//! 2. A TOML file loaded with [`HiveConfig::from_file`]
//! 3. Environment variables (`HIVE_MODEL`, `HIVE_BASE_URL`, ...)
//! 4. Built-in defaults
//!
//! Environment variables are folded into `Default`, so any field a TOML
//! file leaves out falls back to env-or-default. Nothing below the
//! controller reads the environment once a `HiveConfig` exists.
//!
//! ## Example file
//!
//! ```toml
//! simulation = false
//! workers = 30
//! keep_clusters = 4
//! catalog = "factory"
//!
//! [provider]
//! model = "gpt-4o-mini"
//! timeout_secs = 30
//!
//! [memory]
//! persist_threshold = 90
//! ```

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::roles::{CatalogName, RoleCatalog};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_WORKERS: usize = 50;
const DEFAULT_KEEP_CLUSTERS: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 45;
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_PERSIST_THRESHOLD: u8 = 85;
const DEFAULT_RECALL_LIMIT: usize = 2;
const DEFAULT_PREVIEW_LIMIT: usize = 5;
const DEFAULT_VECTOR_DIM: usize = 128;
const DEFAULT_MIN_LATENCY_MS: u64 = 500;
const DEFAULT_MAX_LATENCY_MS: u64 = 2_000;
const DEFAULT_SYNTHESIS_DELAY_MS: u64 = 1_500;

const ENV_MODEL: &str = "HIVE_MODEL";
const ENV_EMBEDDING_MODEL: &str = "HIVE_EMBEDDING_MODEL";
const ENV_BASE_URL: &str = "HIVE_BASE_URL";
const ENV_API_KEY: &str = "HIVE_API_KEY";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_SIMULATION: &str = "HIVE_SIMULATION";

fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// OpenAI-compatible endpoint used in live mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Generation model for workers and the synthesizer.
    pub model: String,
    pub embedding_model: String,
    /// Base URL including the version segment (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Worker sampling temperature. The synthesizer uses the provider default.
    pub temperature: f64,
    /// Per-worker bound on the generation call.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model: lookup(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: lookup(ENV_EMBEDDING_MODEL)
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            base_url: lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: lookup(ENV_API_KEY).or_else(|| lookup(ENV_OPENAI_API_KEY)),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::from_lookup(env_lookup)
    }
}

/// Knobs of simulation mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationProfile {
    pub vector_dim: usize,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub synthesis_delay_ms: u64,
}

impl SimulationProfile {
    pub fn latency_range(&self) -> std::ops::RangeInclusive<u64> {
        self.min_latency_ms..=self.max_latency_ms
    }

    pub fn synthesis_delay(&self) -> Duration {
        Duration::from_millis(self.synthesis_delay_ms)
    }

    /// No sleeping at all; used by tests that only care about shapes.
    pub fn instant(vector_dim: usize) -> Self {
        Self {
            vector_dim,
            min_latency_ms: 0,
            max_latency_ms: 0,
            synthesis_delay_ms: 0,
        }
    }
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            vector_dim: DEFAULT_VECTOR_DIM,
            min_latency_ms: DEFAULT_MIN_LATENCY_MS,
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
            synthesis_delay_ms: DEFAULT_SYNTHESIS_DELAY_MS,
        }
    }
}

/// Recall/persist settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub recall_limit: usize,
    /// Syntheses with confidence at or above this are persisted.
    pub persist_threshold: u8,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recall_limit: DEFAULT_RECALL_LIMIT,
            persist_threshold: DEFAULT_PERSIST_THRESHOLD,
        }
    }
}

/// Everything a run needs, injected into the pipeline at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    /// Pipeline-wide switch: simulated workers and synthesis, no provider calls.
    pub simulation: bool,
    pub workers: usize,
    /// Upper bound on clusters (and therefore representatives).
    pub keep_clusters: usize,
    /// Fixed concurrency budget. `None` asks the capacity estimator.
    pub concurrency: Option<usize>,
    /// Worker completions surfaced as previews during dispatch.
    pub preview_limit: usize,
    pub catalog: CatalogName,
    /// Custom catalog; replaces `catalog` when present.
    pub roles: Option<Vec<String>>,
    /// Seeds role selection and clustering.
    pub seed: Option<u64>,
    pub provider: ProviderConfig,
    pub sim: SimulationProfile,
    pub memory: MemoryConfig,
}

impl HiveConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let simulation = lookup(ENV_SIMULATION)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(true);
        Self {
            simulation,
            workers: DEFAULT_WORKERS,
            keep_clusters: DEFAULT_KEEP_CLUSTERS,
            concurrency: None,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            catalog: CatalogName::default(),
            roles: None,
            seed: None,
            provider: ProviderConfig::from_lookup(lookup),
            sim: SimulationProfile::default(),
            memory: MemoryConfig::default(),
        }
    }

    /// Parse a TOML file. Missing keys fall back to env-or-default.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid TOML")
    }

    /// File if given, otherwise env-or-default.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(v) = overrides.simulation {
            self.simulation = v;
        }
        if let Some(v) = overrides.workers {
            self.workers = v;
        }
        if let Some(v) = overrides.keep_clusters {
            self.keep_clusters = v;
        }
        if let Some(v) = overrides.concurrency {
            self.concurrency = Some(v);
        }
        if let Some(v) = overrides.seed {
            self.seed = Some(v);
        }
        if let Some(v) = overrides.model {
            self.provider.model = v;
        }
        if let Some(v) = overrides.embedding_model {
            self.provider.embedding_model = v;
        }
        if let Some(v) = overrides.base_url {
            self.provider.base_url = v;
        }
        if let Some(v) = overrides.timeout_secs {
            self.provider.timeout_secs = v;
        }
        if overrides.disable_memory {
            self.memory.enabled = false;
        }
        self
    }

    pub fn role_catalog(&self) -> Result<RoleCatalog, ConfigError> {
        match &self.roles {
            Some(custom) => RoleCatalog::new(custom.clone()),
            None => Ok(RoleCatalog::builtin(self.catalog)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be > 0"));
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::invalid("concurrency", "must be > 0 when set"));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::invalid(
                "provider.temperature",
                format!("must be in [0, 2], got {}", self.provider.temperature),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::invalid("provider.timeout_secs", "must be > 0"));
        }
        if self.sim.vector_dim == 0 {
            return Err(ConfigError::invalid("sim.vector_dim", "must be > 0"));
        }
        if self.sim.min_latency_ms > self.sim.max_latency_ms {
            return Err(ConfigError::invalid(
                "sim.min_latency_ms",
                format!(
                    "{} exceeds max_latency_ms {}",
                    self.sim.min_latency_ms, self.sim.max_latency_ms
                ),
            ));
        }
        if self.memory.persist_threshold > 100 {
            return Err(ConfigError::invalid(
                "memory.persist_threshold",
                format!("must be <= 100, got {}", self.memory.persist_threshold),
            ));
        }
        self.role_catalog()?;
        if !self.simulation && self.provider.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self::from_lookup(env_lookup)
    }
}

/// Command-line overrides. `None` leaves the lower-precedence value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub simulation: Option<bool>,
    pub workers: Option<usize>,
    pub keep_clusters: Option<usize>,
    pub concurrency: Option<usize>,
    pub seed: Option<u64>,
    pub model: Option<String>,
    pub embedding_model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub disable_memory: bool,
}
