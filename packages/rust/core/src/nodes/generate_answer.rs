//! Answer step: one call to the reasoning backend over the gathered context.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use scrapegraph_graph::{KeyExpr, Node, NodeContext, NodeOutcome, State, resolve_inputs};
use scrapegraph_shared::{
    AnswerRequest, Document, ReasoningCapability, Result, SchemaDescriptor, ScrapeGraphError,
};

use super::{ANSWER_KEY, CHUNKS_KEY, DOC_KEY, PROMPT_KEY};
use crate::prompts;

/// Reads `user_prompt & (relevant_chunks | doc)`, writes `answer`.
pub struct GenerateAnswerNode {
    input: KeyExpr,
    output: Vec<String>,
    llm: Arc<dyn ReasoningCapability>,
    instructions: String,
    schema: Option<SchemaDescriptor>,
}

impl GenerateAnswerNode {
    pub fn new(
        llm: Arc<dyn ReasoningCapability>,
        instructions: impl Into<String>,
        schema: Option<SchemaDescriptor>,
    ) -> Self {
        Self {
            input: KeyExpr::All(vec![
                KeyExpr::key(PROMPT_KEY),
                KeyExpr::Any(vec![KeyExpr::key(CHUNKS_KEY), KeyExpr::key(DOC_KEY)]),
            ]),
            output: vec![ANSWER_KEY.to_string()],
            llm,
            instructions: instructions.into(),
            schema,
        }
    }

    fn context(state: &State, keys: &[String]) -> Result<String> {
        if keys.iter().any(|k| k == CHUNKS_KEY) {
            let chunks: Vec<String> = state.get_as(CHUNKS_KEY)?.unwrap_or_default();
            return Ok(prompts::render_chunks(&chunks));
        }
        let documents: Vec<Document> = state.get_as(DOC_KEY)?.unwrap_or_default();
        Ok(prompts::render_documents(&documents))
    }
}

#[async_trait]
impl Node for GenerateAnswerNode {
    fn name(&self) -> &str {
        "generate_answer"
    }

    fn input(&self) -> &KeyExpr {
        &self.input
    }

    fn output(&self) -> &[String] {
        &self.output
    }

    #[instrument(skip_all, fields(node = "generate_answer", model = %self.llm.model()))]
    async fn execute(&self, mut state: State, ctx: &mut NodeContext) -> Result<NodeOutcome> {
        let keys = resolve_inputs(self, &state)?;
        let question = state
            .get_str(PROMPT_KEY)
            .ok_or_else(|| ScrapeGraphError::wiring("user_prompt must be a string"))?
            .to_string();

        let request = AnswerRequest {
            instructions: self.instructions.clone(),
            question,
            context: Self::context(&state, &keys)?,
            schema: self.schema.clone(),
        };

        let payload = self.llm.answer(&request).await?;
        ctx.record_usage(payload.usage);
        info!(
            context_chars = request.context.len(),
            total_tokens = payload.usage.total_tokens,
            "answer generated"
        );

        state.insert(ANSWER_KEY, payload.answer);
        Ok(NodeOutcome::Continue(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapegraph_shared::{AnswerPayload, RunId, Usage};
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLlm {
        requests: Mutex<Vec<AnswerRequest>>,
    }

    #[async_trait]
    impl ReasoningCapability for RecordingLlm {
        fn model(&self) -> &str {
            "recording"
        }

        async fn answer(&self, request: &AnswerRequest) -> Result<AnswerPayload> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(AnswerPayload {
                answer: Value::String("42".into()),
                usage: Usage {
                    total_tokens: 7,
                    requests: 1,
                    ..Default::default()
                },
            })
        }
    }

    fn docs_state() -> State {
        let mut state = State::new().with("user_prompt", "How many?");
        state
            .insert_serialized("doc", &vec![Document::new("a.json", "{\"n\": 42}")])
            .unwrap();
        state
    }

    #[tokio::test]
    async fn answers_from_documents() {
        let llm = Arc::new(RecordingLlm::default());
        let node = GenerateAnswerNode::new(llm.clone(), "be brief", None);
        let mut ctx = NodeContext::new(RunId::new());

        let outcome = node.execute(docs_state(), &mut ctx).await.unwrap();

        assert_eq!(outcome.state().get_str("answer"), Some("42"));
        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].question, "How many?");
        assert_eq!(requests[0].context, "{\"n\": 42}");
        assert_eq!(requests[0].instructions, "be brief");
    }

    #[tokio::test]
    async fn prefers_relevant_chunks() {
        let llm = Arc::new(RecordingLlm::default());
        let node = GenerateAnswerNode::new(llm.clone(), "", None);
        let mut state = docs_state();
        state
            .insert_serialized("relevant_chunks", &vec!["chunk one", "chunk two"])
            .unwrap();

        node.execute(state, &mut NodeContext::new(RunId::new()))
            .await
            .unwrap();

        assert_eq!(llm.requests.lock().unwrap()[0].context, "chunk one\n\nchunk two");
    }

    #[test]
    fn input_contract_renders() {
        let node = GenerateAnswerNode::new(Arc::new(RecordingLlm::default()), "", None);
        assert_eq!(node.input().to_string(), "user_prompt & (relevant_chunks | doc)");
    }
}
