use crate::engine::router::RoutePolicy;
use crate::errors::ConfigError;
use crate::executor::ExecutorSettings;
use crate::model::RoutingMode;
use crate::similarity::SimilarityMetric;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod path_resolver;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "sqlroute.yaml";
pub const DEFAULT_API_KEY_ENV: &str = "SQLROUTE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(rename = "configVersion", default = "default_version")]
    pub version: u32,
    /// Relational SQLite database queried for table-backed questions.
    pub database: String,
    /// Interaction store file.
    #[serde(default = "default_store")]
    pub store: String,
    #[serde(default)]
    pub datasets: BTreeMap<String, String>,
    #[serde(default = "default_refresh_secs")]
    pub schema_refresh_secs: u64,
    #[serde(default)]
    pub routing: RoutingMode,
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default)]
    pub translator: TranslatorSettings,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}

fn default_store() -> String {
    "sqlroute-memory.db".to_string()
}

fn default_refresh_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// A stored question must score strictly above this to be reused.
    pub reuse_threshold: f64,
    /// A new question scoring strictly above this against a stored one is not written.
    pub dedup_threshold: f64,
    pub similarity: SimilarityMetric,
    pub store_results: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            reuse_threshold: 0.95,
            dedup_threshold: 0.85,
            similarity: SimilarityMetric::default(),
            store_results: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    Gemini,
    Fake,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Fake => "fake",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Fake => "fake",
        }
    }
}

/// Canned answer for the fake provider: questions containing `contains`
/// (case-insensitive) translate to `sql`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeRule {
    pub contains: String,
    pub sql: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub fake_sql: Option<String>,
    pub fake_rules: Vec<FakeRule>,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            api_url: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.0,
            max_tokens: 512,
            timeout_ms: 30_000,
            retries: 1,
            retry_backoff_ms: 250,
            fake_sql: None,
            fake_rules: Vec::new(),
        }
    }
}

impl TranslatorSettings {
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub timeout_ms: u64,
    pub max_rows: usize,
    pub dataset_cache_entries: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_rows: 10_000,
            dataset_cache_entries: crate::tabular::DEFAULT_CACHE_ENTRIES,
        }
    }
}

impl RouterConfig {
    /// A config with defaults everywhere except the relational database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            database: database.into(),
            store: default_store(),
            datasets: BTreeMap::new(),
            schema_refresh_secs: default_refresh_secs(),
            routing: RoutingMode::default(),
            memory: MemorySettings::default(),
            translator: TranslatorSettings::default(),
            executor: ExecutorConfig::default(),
        }
    }

    pub fn policy(&self) -> RoutePolicy {
        RoutePolicy {
            reuse_threshold: self.memory.reuse_threshold,
            dedup_threshold: self.memory.dedup_threshold,
            routing: self.routing,
            store_results: self.memory.store_results,
            translate_timeout: Duration::from_millis(self.translator.timeout_ms),
            translate_retries: self.translator.retries,
            retry_backoff: Duration::from_millis(self.translator.retry_backoff_ms),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            timeout: Duration::from_millis(self.executor.timeout_ms),
            max_rows: self.executor.max_rows,
        }
    }

    pub fn schema_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.schema_refresh_secs)
    }

    pub fn dataset_paths(&self) -> BTreeMap<String, PathBuf> {
        self.datasets
            .iter()
            .map(|(name, path)| (name.clone(), PathBuf::from(path)))
            .collect()
    }

    /// The translator credential from the environment variable named in the config.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.translator.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported configVersion {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError("'database' must be set".into()));
        }
        if self.store.trim().is_empty() {
            return Err(ConfigError("'store' must not be empty".into()));
        }
        for (key, value) in [
            ("memory.reuse_threshold", self.memory.reuse_threshold),
            ("memory.dedup_threshold", self.memory.dedup_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    key, value
                )));
            }
        }
        if self.executor.timeout_ms == 0 || self.translator.timeout_ms == 0 {
            return Err(ConfigError("timeouts must be greater than zero".into()));
        }
        if self.executor.max_rows == 0 {
            return Err(ConfigError("executor.max_rows must be greater than zero".into()));
        }

        let mut lowered = BTreeSet::new();
        for name in self.datasets.keys() {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit());
            if !valid {
                return Err(ConfigError(format!(
                    "dataset name '{}' must be a plain identifier",
                    name
                )));
            }
            if !lowered.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError(format!(
                    "dataset names must differ by more than case: '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Applies `SQLROUTE_DB` / `SQLROUTE_STORE` style overrides from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup("SQLROUTE_DB").filter(|v| !v.trim().is_empty()) {
            self.database = db;
        }
        if let Some(store) = lookup("SQLROUTE_STORE").filter(|v| !v.trim().is_empty()) {
            self.store = store;
        }
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<RouterConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let mut cfg = parse_config(&raw, strict)
        .map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))?;

    normalize_paths(&mut cfg, path);
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    Ok(cfg)
}

/// Parses and validates YAML text. Paths are left as written.
pub fn parse_config(raw: &str, strict: bool) -> Result<RouterConfig, ConfigError> {
    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let cfg: RouterConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    // `x-` and `_` prefixed keys are YAML anchor holders
    let unknown: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields in strict mode: {:?}",
                unknown
            )));
        }
        tracing::warn!(event = "config.unknown_fields", fields = ?unknown);
    }

    cfg.validate()?;
    Ok(cfg)
}

fn normalize_paths(cfg: &mut RouterConfig, config_path: &Path) {
    let r = path_resolver::PathResolver::new(config_path);
    r.resolve_str(&mut cfg.database);
    r.resolve_str(&mut cfg.store);
    for path in cfg.datasets.values_mut() {
        r.resolve_str(path);
    }
}

pub const SAMPLE_CONFIG: &str = r#"configVersion: 1

# Relational back end (SQLite file)
database: data/app.db
# Question memory
store: .sqlroute/memory.db

# Flat-file datasets, queried as tables of the same name
datasets:
  sales: data/sales.csv
  inventory: data/inventory.csv

schema_refresh_secs: 60
routing: question

memory:
  reuse_threshold: 0.95
  dedup_threshold: 0.85
  similarity: levenshtein
  store_results: true

translator:
  provider: gemini
  model: gemini-1.5-flash
  api_key_env: SQLROUTE_API_KEY
  timeout_ms: 30000
  retries: 1
  retry_backoff_ms: 250

executor:
  timeout_ms: 15000
  max_rows: 10000
"#;

/// Writes [`SAMPLE_CONFIG`] unless `path` already exists. Returns whether it wrote.
pub fn write_sample_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config("database: app.db\n", true).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.store, "sqlroute-memory.db");
        assert_eq!(cfg.routing, RoutingMode::Question);
        assert_eq!(cfg.memory.reuse_threshold, 0.95);
        assert_eq!(cfg.translator.provider, ProviderKind::Gemini);
        assert_eq!(cfg.translator.model_name(), "gemini-1.5-flash");
        assert_eq!(cfg.policy().translate_retries, 1);
    }

    #[test]
    fn sample_config_parses_strictly() {
        let cfg = parse_config(SAMPLE_CONFIG, true).unwrap();
        assert_eq!(cfg.datasets.len(), 2);
        assert_eq!(cfg.memory.similarity, SimilarityMetric::Levenshtein);
    }

    #[test]
    fn unknown_keys_fail_only_in_strict_mode() {
        let raw = "database: app.db\nmemory:\n  reuse: 0.5\n";
        let err = parse_config(raw, true).unwrap_err();
        assert!(err.0.contains("memory.reuse"), "{}", err);
        assert!(parse_config(raw, false).is_ok());
    }

    #[test]
    fn thresholds_outside_unit_interval_rejected() {
        let err = parse_config("database: a.db\nmemory:\n  reuse_threshold: 1.5\n", true).unwrap_err();
        assert!(err.0.contains("reuse_threshold"));
        assert!(parse_config("database: a.db\nmemory:\n  dedup_threshold: -0.1\n", true).is_err());
    }

    #[test]
    fn dataset_names_must_be_identifiers() {
        assert!(parse_config("database: a.db\ndatasets:\n  sales-2024: s.csv\n", true).is_err());
        assert!(parse_config("database: a.db\ndatasets:\n  Sales: a.csv\n  sales: b.csv\n", true).is_err());
    }

    #[test]
    fn env_overrides_replace_paths() {
        let mut cfg = RouterConfig::new("a.db");
        cfg.apply_env_overrides(|k| match k {
            "SQLROUTE_DB" => Some("/srv/other.db".into()),
            _ => None,
        });
        assert_eq!(cfg.database, "/srv/other.db");
        assert_eq!(cfg.store, "sqlroute-memory.db");
    }
}
