//! Application configuration for KidPlanner.
//!
//! User config lives at `~/.kidplanner/kidplanner.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KidPlannerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kidplanner.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kidplanner";

// ---------------------------------------------------------------------------
// Config structs (matching kidplanner.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Pipeline timeouts and prompt budgets.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Event sources consulted by the discovery capability.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Date window used when a request does not name one.
    #[serde(default = "default_date_range")]
    pub date_range: String,

    /// Number of catalog entries returned when no events can be parsed.
    #[serde(default = "default_fallback_count")]
    pub fallback_count: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            date_range: default_date_range(),
            fallback_count: default_fallback_count(),
        }
    }
}

fn default_date_range() -> String {
    "next_2_weeks".into()
}
fn default_fallback_count() -> usize {
    3
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every stage.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1500
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeout for a single text-completion call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Timeout for a single capability invocation.
    #[serde(default = "default_capability_timeout")]
    pub capability_timeout_secs: u64,

    /// Characters of each upstream artifact passed to the synthesis stage.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            capability_timeout_secs: default_capability_timeout(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_call_timeout() -> u64 {
    60
}
fn default_capability_timeout() -> u64 {
    20
}
fn default_excerpt_chars() -> usize {
    500
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Include the built-in mock catalog.
    #[serde(default = "default_true")]
    pub use_mock_catalog: bool,

    /// HTML event-listing pages to scrape.
    #[serde(default)]
    pub listing_urls: Vec<String>,

    /// HTTP timeout for listing pages.
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            use_mock_catalog: true,
            listing_urls: Vec::new(),
            timeout_secs: default_source_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_source_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Pipeline settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline settings derived from the config file.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Timeout for each text-completion call.
    pub call_timeout: Duration,
    /// Timeout for each capability invocation.
    pub capability_timeout: Duration,
    /// Per-artifact character budget in the synthesis prompt.
    pub excerpt_chars: usize,
    /// Fallback catalog slice size used by the formatter.
    pub fallback_count: usize,
    /// Date window passed to the discovery capability.
    pub date_range: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.pipeline.call_timeout_secs),
            capability_timeout: Duration::from_secs(config.pipeline.capability_timeout_secs),
            excerpt_chars: config.pipeline.excerpt_chars,
            fallback_count: config.defaults.fallback_count,
            date_range: config.defaults.date_range.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kidplanner/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KidPlannerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kidplanner/kidplanner.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| KidPlannerError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        KidPlannerError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KidPlannerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KidPlannerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KidPlannerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(KidPlannerError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable \
             or run with --offline."
        ))),
    }
}
