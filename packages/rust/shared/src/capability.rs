//! Capability interfaces consumed by pipeline nodes.
//!
//! Nodes depend only on these traits; concrete backends live in
//! `scrapegraph-fetch` and `scrapegraph-providers`, and tests substitute
//! their own implementations through constructor injection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EmbedderConfig, LlmConfig};
use crate::error::Result;
use crate::source::InputKey;
use crate::types::{Document, SchemaDescriptor, Usage};

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Turns a source descriptor into normalized records.
#[async_trait]
pub trait FetchCapability: Send + Sync {
    /// Read one file or enumerate a directory, depending on `input_key.kind`.
    ///
    /// Fails with `SourceNotFound` or `Parse` on bad input.
    async fn fetch(&self, source: &str, input_key: InputKey) -> Result<Vec<Document>>;
}

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

/// A single answer-generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRequest {
    /// System-level instructions for the model.
    pub instructions: String,
    /// The user's natural-language question.
    pub question: String,
    /// Source content the answer must be grounded in.
    pub context: String,
    /// Optional output shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDescriptor>,
}

/// What a reasoning backend returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    /// Plain text answers are JSON strings; schema-bound answers are objects.
    pub answer: serde_json::Value,
    #[serde(default)]
    pub usage: Usage,
}

/// Answer-generation backend.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Model identifier, for logs and execution info.
    fn model(&self) -> &str;

    async fn answer(&self, request: &AnswerRequest) -> Result<AnswerPayload>;
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// Vectors returned by an embedding backend, one per input text, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub usage: Usage,
}

/// Embedding backend, used only by retrieval steps.
#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Embeddings>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds capability handles from configuration.
///
/// Fails with `Configuration` when required fields are missing or the model
/// is not recognized.
pub trait CapabilityFactory: Send + Sync {
    fn create_llm(&self, config: &LlmConfig) -> Result<Arc<dyn ReasoningCapability>>;

    fn create_embedder(&self, config: &EmbedderConfig) -> Result<Arc<dyn EmbeddingCapability>>;
}
