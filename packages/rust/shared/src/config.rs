//! Application configuration for ArticleFix.
//!
//! User config lives at `~/.articlefix/articlefix.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArticleFixError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "articlefix.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".articlefix";

// ---------------------------------------------------------------------------
// Config structs (matching articlefix.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generative model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Validation gate settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Per-category overrides, keyed by category name (`empty-translation`, ...).
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Article database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory holding progress ledgers and results logs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Worker pool size.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Same-pair records sharing one prompt.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush the ledger after this many recorded outcomes.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            data_dir: default_data_dir(),
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            flush_every: default_flush_every(),
        }
    }
}

fn default_database_path() -> String {
    "~/.articlefix/articles.db".into()
}
fn default_data_dir() -> String {
    "~/.articlefix/runs".into()
}
fn default_concurrency() -> usize {
    10
}
fn default_batch_size() -> usize {
    1
}
fn default_flush_every() -> usize {
    5
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// REST base URL of the generative language API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// First backoff delay in milliseconds.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> usize {
    3
}
fn default_min_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_temperature() -> f32 {
    0.3
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum candidate/original length ratio when a category sets none.
    #[serde(default = "default_min_length_ratio")]
    pub min_length_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_length_ratio: default_min_length_ratio(),
        }
    }
}

fn default_min_length_ratio() -> f64 {
    0.8
}

/// `[categories.<name>]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// `0.0` waives the length check for this category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length_ratio: Option<f64>,
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Settings for one repair run, injected into the orchestrator.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Worker pool size.
    pub concurrency: usize,
    pub batch_size: usize,
    pub flush_every: usize,
    /// Length ratio override. `None` lets the strategy choose.
    pub min_length_ratio: Option<f64>,
    /// Ratio used when neither the category nor the strategy sets one.
    pub default_min_length_ratio: f64,
    /// Directory for ledgers and results logs.
    pub data_dir: PathBuf,
}

impl RepairConfig {
    /// Resolve the length ratio, preferring the category override, then the
    /// strategy's own preference.
    pub fn length_ratio(&self, strategy_preference: Option<f64>) -> f64 {
        self.min_length_ratio
            .or(strategy_preference)
            .unwrap_or(self.default_min_length_ratio)
    }

    /// Resolve run settings for a category: category overrides first, then defaults.
    pub fn for_category(config: &AppConfig, category: &str) -> Self {
        let overrides = config.categories.get(category).cloned().unwrap_or_default();
        Self {
            concurrency: overrides
                .concurrency
                .unwrap_or(config.defaults.concurrency)
                .max(1),
            batch_size: overrides
                .batch_size
                .unwrap_or(config.defaults.batch_size)
                .max(1),
            flush_every: config.defaults.flush_every.max(1),
            min_length_ratio: overrides.min_length_ratio,
            default_min_length_ratio: config.validation.min_length_ratio,
            data_dir: expand_home(&config.defaults.data_dir),
        }
    }
}

/// Resolved model-client settings. The API key is read once at the edge.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub temperature: f32,
}

impl ModelSettings {
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            temperature: config.temperature,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.articlefix/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArticleFixError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.articlefix/articlefix.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ArticleFixError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ArticleFixError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArticleFixError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArticleFixError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArticleFixError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the model API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.model.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(ArticleFixError::config(format!(
            "model API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.concurrency, 10);
        assert_eq!(parsed.model.max_attempts, 3);
        assert_eq!(parsed.model.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn category_overrides() {
        let toml_str = r#"
[defaults]
batch_size = 5

[categories.placeholder-pronunciation]
concurrency = 3
batch_size = 1

[categories.truncated-ending]
min_length_ratio = 0.95
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");

        let pron = RepairConfig::for_category(&config, "placeholder-pronunciation");
        assert_eq!(pron.concurrency, 3);
        assert_eq!(pron.batch_size, 1);
        assert_eq!(pron.min_length_ratio, None);

        let trunc = RepairConfig::for_category(&config, "truncated-ending");
        assert_eq!(trunc.concurrency, 10);
        assert_eq!(trunc.batch_size, 5);
        assert_eq!(trunc.min_length_ratio, Some(0.95));
        assert_eq!(trunc.length_ratio(Some(0.5)), 0.95);
        assert_eq!(pron.length_ratio(Some(0.5)), 0.5);
        assert_eq!(pron.length_ratio(None), 0.8);
    }

    #[test]
    fn model_settings_clamp_attempts() {
        let model = ModelConfig {
            max_attempts: 0,
            ..ModelConfig::default()
        };
        let settings = ModelSettings::new(&model, "key");
        assert_eq!(settings.max_attempts, 1);
        assert_eq!(settings.timeout, Duration::from_secs(120));
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.model.api_key_env = "AF_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }
}
