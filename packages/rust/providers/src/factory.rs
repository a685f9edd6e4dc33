//! Builds capability handles from `provider/model` identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use scrapegraph_shared::{
    CapabilityFactory, EmbedderConfig, EmbeddingCapability, LlmConfig, ReasoningCapability,
    Result, ScrapeGraphError,
};

use crate::client::{DEFAULT_TIMEOUT_SECS, OpenAiCompatibleClient};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Recognized backend providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    OpenRouter,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Env var holding the API key, `None` for local providers.
    pub fn default_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ScrapeGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(ScrapeGraphError::config(format!(
                "unknown provider '{other}' (expected openai, openrouter or ollama)"
            ))),
        }
    }
}

/// Split `"openai/gpt-4o-mini"` into provider and model name.
///
/// Only the first `/` separates; OpenRouter model names contain their own.
pub fn parse_model_id(model: &str) -> Result<(Provider, &str)> {
    let (provider, name) = model.split_once('/').ok_or_else(|| {
        ScrapeGraphError::config(format!(
            "model '{model}' must be written as '<provider>/<model>'"
        ))
    })?;
    if name.is_empty() {
        return Err(ScrapeGraphError::config(format!(
            "model '{model}' has an empty model name"
        )));
    }
    Ok((provider.parse()?, name))
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

type KeyLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// The production [`CapabilityFactory`].
#[derive(Clone)]
pub struct ProviderFactory {
    lookup_key: Arc<KeyLookup>,
}

impl fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory").finish_non_exhaustive()
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory {
    /// Resolve API keys from the process environment.
    pub fn new() -> Self {
        Self::with_key_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Resolve API keys through `lookup` instead of the environment.
    pub fn with_key_lookup(
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            lookup_key: Arc::new(lookup),
        }
    }

    fn api_key(&self, provider: Provider, key_env: Option<&str>) -> Result<Option<String>> {
        let Some(var) = key_env.or(provider.default_key_env()) else {
            return Ok(None);
        };
        match (self.lookup_key)(var) {
            Some(key) => Ok(Some(key)),
            None => Err(ScrapeGraphError::config(format!(
                "{provider} requires an API key: set {var}"
            ))),
        }
    }

    fn client(
        &self,
        model: &str,
        base_url: Option<&str>,
        key_env: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<OpenAiCompatibleClient> {
        let (provider, name) = parse_model_id(model)?;
        let api_key = self.api_key(provider, key_env)?;
        let base_url = base_url.unwrap_or(provider.default_base_url());
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        debug!(%provider, model = name, base_url, "creating backend client");
        OpenAiCompatibleClient::new(base_url, name, api_key, timeout)
    }
}

impl CapabilityFactory for ProviderFactory {
    #[instrument(skip_all, fields(model = %config.model))]
    fn create_llm(&self, config: &LlmConfig) -> Result<Arc<dyn ReasoningCapability>> {
        config.validate()?;
        let client = self
            .client(
                &config.model,
                config.base_url.as_deref(),
                config.api_key_env.as_deref(),
                config.timeout_secs,
            )?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        Ok(Arc::new(client))
    }

    #[instrument(skip_all, fields(model = %config.model))]
    fn create_embedder(&self, config: &EmbedderConfig) -> Result<Arc<dyn EmbeddingCapability>> {
        config.validate()?;
        let client = self.client(
            &config.model,
            config.base_url.as_deref(),
            config.api_key_env.as_deref(),
            None,
        )?;
        Ok(Arc::new(client))
    }
}
