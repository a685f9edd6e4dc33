//! Application configuration for ScrapeGraph.
//!
//! User config lives at `~/.scrapegraph/scrapegraph.toml`.
//! CLI flags override config file values, which override defaults.
//! Every section rejects unknown fields so typos fail at load time instead of
//! being silently ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ScrapeGraphError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "scrapegraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".scrapegraph";

// ---------------------------------------------------------------------------
// Config structs (matching scrapegraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Reasoning backend used by the answer node. Required in config files.
    pub llm: LlmConfig,

    /// Embedding backend. When present, pipelines add a retrieval step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedder: Option<EmbedderConfig>,

    /// Graph-level options shared by the nodes.
    #[serde(default)]
    pub graph: GraphOptions,
}

/// `[llm]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Model identifier in `<provider>/<model>` form.
    pub model: String,

    /// Sampling temperature (0.0 – 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Override for the provider's API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl LlmConfig {
    /// Minimal config naming only the model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            base_url: None,
            api_key_env: None,
            timeout_secs: None,
        }
    }

    /// Builder-style temperature setter.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::new(default_llm_model())
    }
}

fn default_llm_model() -> String {
    "openai/gpt-4o-mini".into()
}

/// `[embedder]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbedderConfig {
    /// Model identifier in `<provider>/<model>` form.
    pub model: String,

    /// Override for the provider's API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Name of the env var holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl EmbedderConfig {
    /// Minimal config naming only the model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: None,
            api_key_env: None,
        }
    }
}

/// `[graph]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphOptions {
    /// Extra instructions appended to the answer prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,

    /// Maximum characters per retrieval chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Number of chunks kept by the retrieval step.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            additional_info: None,
            chunk_size: default_chunk_size(),
            top_k: default_top_k(),
        }
    }
}

fn default_chunk_size() -> usize {
    4096
}
fn default_top_k() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Config with the given reasoning model and defaults elsewhere.
    pub fn with_llm(llm: LlmConfig) -> Self {
        Self {
            llm,
            ..Default::default()
        }
    }

    /// Check field-level constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;
        if let Some(embedder) = &self.embedder {
            embedder.validate()?;
        }
        if self.graph.chunk_size == 0 {
            return Err(ScrapeGraphError::config("graph.chunk_size must be > 0"));
        }
        if self.graph.top_k == 0 {
            return Err(ScrapeGraphError::config("graph.top_k must be > 0"));
        }
        Ok(())
    }
}

impl LlmConfig {
    /// Check that the model is named and numeric parameters are in range.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ScrapeGraphError::config("llm.model is required"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ScrapeGraphError::config(format!(
                    "llm.temperature must be between 0.0 and 2.0, got {t}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ScrapeGraphError::config("llm.max_tokens must be > 0"));
        }
        validate_base_url("llm.base_url", self.base_url.as_deref())
    }
}

impl EmbedderConfig {
    /// Check that the model is named and the base URL parses.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ScrapeGraphError::config("embedder.model is required"));
        }
        validate_base_url("embedder.base_url", self.base_url.as_deref())
    }
}

fn validate_base_url(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(raw) => Url::parse(raw)
            .map(|_| ())
            .map_err(|e| ScrapeGraphError::config(format!("{field} '{raw}' is not a URL: {e}"))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.scrapegraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScrapeGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.scrapegraph/scrapegraph.toml`).
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

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScrapeGraphError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ScrapeGraphError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScrapeGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScrapeGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScrapeGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
