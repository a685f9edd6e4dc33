//! HTTP client for OpenAI-compatible chat and embedding endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use scrapegraph_shared::{
    AnswerPayload, AnswerRequest, EmbeddingCapability, Embeddings, ReasoningCapability, Result,
    ScrapeGraphError, Usage,
};

/// Default request timeout when the config does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("ScrapeGraph/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl WireUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            requests: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A chat or embedding model served behind an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleClient {
    /// Build a client for `model` at `base_url`.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ScrapeGraphError::config(format!("invalid base_url '{base_url}': {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ScrapeGraphError::Capability(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `{base_url}/{endpoint}` and decode the JSON reply.
    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScrapeGraphError::Capability(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ScrapeGraphError::Capability(format!(
                "{url}: HTTP {status}: {}",
                detail.trim()
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ScrapeGraphError::Capability(format!("{url}: malformed response: {e}")))
    }
}

fn user_message(request: &AnswerRequest) -> String {
    format!(
        "CONTENT:\n{}\n\nQUESTION: {}",
        request.context, request.question
    )
}

#[async_trait]
impl ReasoningCapability for OpenAiCompatibleClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn answer(&self, request: &AnswerRequest) -> Result<AnswerPayload> {
        let response_format = request.schema.as_ref().map(|schema| {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                },
            })
        });

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.instructions.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: user_message(request),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format,
        };

        let reply: ChatResponse = self.post("chat/completions", &body).await?;
        let usage = reply.usage.unwrap_or_default().into_usage();
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ScrapeGraphError::Capability("response contained no message".into()))?;

        debug!(
            chars = content.len(),
            total_tokens = usage.total_tokens,
            "chat completion received"
        );

        let answer = match &request.schema {
            Some(schema) => serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
                ScrapeGraphError::parse(format!(
                    "answer for schema '{}' is not valid JSON: {e}",
                    schema.name
                ))
            })?,
            None => Value::String(content),
        };

        Ok(AnswerPayload { answer, usage })
    }
}

#[async_trait]
impl EmbeddingCapability for OpenAiCompatibleClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, texts = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings::default());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut reply: EmbeddingResponse = self.post("embeddings", &body).await?;

        if reply.data.len() != texts.len() {
            return Err(ScrapeGraphError::Capability(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                reply.data.len()
            )));
        }
        reply.data.sort_by_key(|d| d.index);

        Ok(Embeddings {
            vectors: reply.data.into_iter().map(|d| d.embedding).collect(),
            usage: reply.usage.unwrap_or_default().into_usage(),
        })
    }
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
