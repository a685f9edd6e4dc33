//! Retrieval step: keeps the document chunks most similar to the prompt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use scrapegraph_graph::{KeyExpr, Node, NodeContext, NodeOutcome, State, resolve_inputs};
use scrapegraph_shared::{Document, EmbeddingCapability, Result, ScrapeGraphError};

use super::{CHUNKS_KEY, DOC_KEY, PROMPT_KEY};

/// Reads `user_prompt & doc`, writes `relevant_chunks`.
pub struct RagNode {
    input: KeyExpr,
    output: Vec<String>,
    embedder: Arc<dyn EmbeddingCapability>,
    chunk_size: usize,
    top_k: usize,
}

impl RagNode {
    pub fn new(embedder: Arc<dyn EmbeddingCapability>, chunk_size: usize, top_k: usize) -> Self {
        Self {
            input: KeyExpr::All(vec![KeyExpr::key(PROMPT_KEY), KeyExpr::key(DOC_KEY)]),
            output: vec![CHUNKS_KEY.to_string()],
            embedder,
            chunk_size: chunk_size.max(1),
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Node for RagNode {
    fn name(&self) -> &str {
        "rag"
    }

    fn input(&self) -> &KeyExpr {
        &self.input
    }

    fn output(&self) -> &[String] {
        &self.output
    }

    #[instrument(skip_all, fields(node = "rag", model = %self.embedder.model()))]
    async fn execute(&self, mut state: State, ctx: &mut NodeContext) -> Result<NodeOutcome> {
        resolve_inputs(self, &state)?;
        let prompt = state
            .get_str(PROMPT_KEY)
            .ok_or_else(|| ScrapeGraphError::wiring("user_prompt must be a string"))?
            .to_string();
        let documents: Vec<Document> = state.get_as(DOC_KEY)?.unwrap_or_default();

        let chunks: Vec<String> = documents
            .iter()
            .flat_map(|d| chunk_text(&d.content, self.chunk_size))
            .collect();

        let selected = if chunks.len() <= self.top_k {
            debug!(chunks = chunks.len(), "all chunks fit, skipping embedding");
            chunks
        } else {
            let mut texts = Vec::with_capacity(chunks.len() + 1);
            texts.push(prompt);
            texts.extend(chunks.iter().cloned());

            let embeddings = self.embedder.embed(&texts).await?;
            ctx.record_usage(embeddings.usage);

            let Some((query, vectors)) = embeddings.vectors.split_first() else {
                return Err(ScrapeGraphError::Capability(
                    "embedding backend returned no vectors".into(),
                ));
            };
            if vectors.len() != chunks.len() {
                return Err(ScrapeGraphError::Capability(format!(
                    "expected {} chunk embeddings, got {}",
                    chunks.len(),
                    vectors.len()
                )));
            }

            let keep = top_k_indices(query, vectors, self.top_k);
            debug!(total = chunks.len(), kept = keep.len(), "chunks selected");
            keep.into_iter().map(|i| chunks[i].clone()).collect()
        };

        state.insert_serialized(CHUNKS_KEY, &selected)?;
        Ok(NodeOutcome::Continue(state))
    }
}

/// Split `text` into chunks of at most `max_chars` characters, breaking on
/// line boundaries. Lines longer than `max_chars` are split mid-line.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Indices of the `k` vectors most similar to `query`, in input order.
fn top_k_indices(query: &[f32], vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine(query, v)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);

    let mut indices: Vec<usize> = scored.into_iter().map(|(i, _)| i).collect();
    indices.sort_unstable();
    indices
}
