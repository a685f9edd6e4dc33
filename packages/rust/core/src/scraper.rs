//! The scraper facade: prompt + source in, answer out.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use scrapegraph_fetch::LocalFetcher;
use scrapegraph_graph::{ExecutionInfo, Graph, RunOptions, State};
use scrapegraph_providers::ProviderFactory;
use scrapegraph_shared::{
    AppConfig, CapabilityFactory, FetchCapability, InputKey, Result, SchemaDescriptor,
    ScrapeGraphError, SourceType,
};

use crate::nodes::{ANSWER_KEY, FetchNode, GenerateAnswerNode, PROMPT_KEY, RagNode};
use crate::prompts;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Injected dependencies of a [`ScraperGraph`].
#[derive(Clone)]
pub struct Collaborators {
    pub factory: Arc<dyn CapabilityFactory>,
    pub fetcher: Arc<dyn FetchCapability>,
}

impl Collaborators {
    pub fn new(factory: Arc<dyn CapabilityFactory>, fetcher: Arc<dyn FetchCapability>) -> Self {
        Self { factory, fetcher }
    }

    /// HTTP providers and the local filesystem.
    pub fn local() -> Self {
        Self::new(Arc::new(ProviderFactory::new()), Arc::new(LocalFetcher::new()))
    }
}

// ---------------------------------------------------------------------------
// ScraperGraph
// ---------------------------------------------------------------------------

/// Answers a question about one file or a directory of files.
///
/// The source is classified once at construction; its [`InputKey`] decides
/// whether the fetch step reads a single file or a whole directory.
pub struct ScraperGraph {
    prompt: String,
    source: String,
    source_type: SourceType,
    input_key: InputKey,
    graph: Graph,
    final_state: Option<State>,
    execution_info: Option<ExecutionInfo>,
}

impl ScraperGraph {
    /// Classify `source`, build capabilities from `config`, and assemble the graph.
    ///
    /// The factory is called once for `config.llm` and once more for
    /// `config.embedder` when it is set.
    #[instrument(skip_all, fields(source_type = %source_type))]
    pub fn new(
        source_type: SourceType,
        prompt: impl Into<String>,
        source: impl AsRef<str>,
        config: &AppConfig,
        schema: Option<SchemaDescriptor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let source = source.as_ref().to_string();
        let input_key = InputKey::for_source(source_type, &source);

        let llm = collaborators.factory.create_llm(&config.llm)?;
        let embedder = config
            .embedder
            .as_ref()
            .map(|c| collaborators.factory.create_embedder(c))
            .transpose()?;

        let instructions = prompts::instructions(
            source_type,
            config.graph.additional_info.as_deref(),
            schema.is_some(),
        );

        let mut builder = Graph::builder(format!("{source_type}_scraper"))
            .seed_keys([PROMPT_KEY.to_string(), input_key.name()])
            .add_node(FetchNode::new(source_type, collaborators.fetcher));
        if let Some(embedder) = embedder {
            builder = builder.add_node(RagNode::new(
                embedder,
                config.graph.chunk_size,
                config.graph.top_k,
            ));
        }
        let graph = builder
            .add_node(GenerateAnswerNode::new(llm, instructions, schema))
            .build()?;

        info!(%input_key, nodes = ?graph.node_names(), "scraper graph built");

        Ok(Self {
            prompt: prompt.into(),
            source,
            source_type,
            input_key,
            graph,
            final_state: None,
            execution_info: None,
        })
    }

    pub fn json(
        prompt: impl Into<String>,
        source: impl AsRef<str>,
        config: &AppConfig,
        schema: Option<SchemaDescriptor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::new(SourceType::Json, prompt, source, config, schema, collaborators)
    }

    pub fn csv(
        prompt: impl Into<String>,
        source: impl AsRef<str>,
        config: &AppConfig,
        schema: Option<SchemaDescriptor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::new(SourceType::Csv, prompt, source, config, schema, collaborators)
    }

    pub fn xml(
        prompt: impl Into<String>,
        source: impl AsRef<str>,
        config: &AppConfig,
        schema: Option<SchemaDescriptor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::new(SourceType::Xml, prompt, source, config, schema, collaborators)
    }

    pub fn markdown(
        prompt: impl Into<String>,
        source: impl AsRef<str>,
        config: &AppConfig,
        schema: Option<SchemaDescriptor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::new(SourceType::Markdown, prompt, source, config, schema, collaborators)
    }

    /// `"json"` for a single file, `"json_dir"` for a directory, and so on per type.
    pub fn input_key(&self) -> String {
        self.input_key.name()
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The seed every run starts from: exactly `user_prompt` and the input key.
    pub fn initial_state(&self) -> State {
        State::new()
            .with(PROMPT_KEY, self.prompt.as_str())
            .with(self.input_key.name(), self.source.as_str())
    }

    /// State left by the last successful run.
    pub fn final_state(&self) -> Option<&State> {
        self.final_state.as_ref()
    }

    /// Timings and usage of the last successful run.
    pub fn execution_info(&self) -> Option<&ExecutionInfo> {
        self.execution_info.as_ref()
    }

    /// Run the graph and return the answer.
    pub async fn run(&mut self) -> Result<String> {
        self.run_with(&RunOptions::default()).await
    }

    /// [`ScraperGraph::run`] with cancellation and progress reporting.
    pub async fn run_with(&mut self, options: &RunOptions) -> Result<String> {
        let (state, info) = self
            .graph
            .execute_with(self.initial_state(), options)
            .await?;

        let answer = answer_text(state.get(ANSWER_KEY));
        self.final_state = Some(state);
        self.execution_info = Some(info);
        answer
    }
}

/// Strings are returned as-is, structured answers as JSON text.
fn answer_text(value: Option<&Value>) -> Result<String> {
    match value {
        None | Some(Value::Null) => Err(ScrapeGraphError::NoAnswer),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => serde_json::to_string_pretty(other)
            .map_err(|e| ScrapeGraphError::parse(format!("cannot render answer: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scrapegraph_graph::CancellationToken;
    use scrapegraph_shared::{
        AnswerPayload, AnswerRequest, Document, EmbedderConfig, EmbeddingCapability, Embeddings,
        InputKind, LlmConfig, ReasoningCapability, Usage,
    };
    use serde_json::json;
    use std::sync::Mutex;

    // -- mocks ---------------------------------------------------------------

    struct MockLlm {
        answer: Value,
        requests: Mutex<Vec<AnswerRequest>>,
    }

    #[async_trait]
    impl ReasoningCapability for MockLlm {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn answer(&self, request: &AnswerRequest) -> Result<AnswerPayload> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(AnswerPayload {
                answer: self.answer.clone(),
                usage: Usage {
                    prompt_tokens: 12,
                    completion_tokens: 3,
                    total_tokens: 15,
                    requests: 1,
                },
            })
        }
    }

    struct MockEmbedder;

    #[async_trait]
    impl EmbeddingCapability for MockEmbedder {
        fn model(&self) -> &str {
            "test-embedder"
        }

        async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
            Ok(Embeddings {
                vectors: texts.iter().map(|_| vec![1.0]).collect(),
                usage: Usage::default(),
            })
        }
    }

    struct MockFactory {
        llm: Arc<MockLlm>,
        llm_configs: Mutex<Vec<LlmConfig>>,
        embedder_configs: Mutex<Vec<EmbedderConfig>>,
        fail: bool,
    }

    impl CapabilityFactory for MockFactory {
        fn create_llm(&self, config: &LlmConfig) -> Result<Arc<dyn ReasoningCapability>> {
            self.llm_configs.lock().unwrap().push(config.clone());
            if self.fail {
                return Err(ScrapeGraphError::config("unknown model"));
            }
            Ok(self.llm.clone())
        }

        fn create_embedder(
            &self,
            config: &EmbedderConfig,
        ) -> Result<Arc<dyn EmbeddingCapability>> {
            self.embedder_configs.lock().unwrap().push(config.clone());
            Ok(Arc::new(MockEmbedder))
        }
    }

    #[derive(Default)]
    struct MockFetcher {
        calls: Mutex<Vec<(String, InputKey)>>,
        missing: bool,
    }

    #[async_trait]
    impl FetchCapability for MockFetcher {
        async fn fetch(&self, source: &str, input_key: InputKey) -> Result<Vec<Document>> {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_string(), input_key));
            if self.missing {
                return Err(ScrapeGraphError::source_not_found(source));
            }
            Ok(vec![Document::new(source, r#"{"name": "Ada"}"#)])
        }
    }

    struct Harness {
        factory: Arc<MockFactory>,
        fetcher: Arc<MockFetcher>,
        llm: Arc<MockLlm>,
    }

    impl Harness {
        fn new(answer: Value) -> Self {
            Self::build(answer, false, false)
        }

        fn build(answer: Value, factory_fails: bool, source_missing: bool) -> Self {
            let llm = Arc::new(MockLlm {
                answer,
                requests: Mutex::new(Vec::new()),
            });
            Self {
                factory: Arc::new(MockFactory {
                    llm: llm.clone(),
                    llm_configs: Mutex::new(Vec::new()),
                    embedder_configs: Mutex::new(Vec::new()),
                    fail: factory_fails,
                }),
                fetcher: Arc::new(MockFetcher {
                    calls: Mutex::new(Vec::new()),
                    missing: source_missing,
                }),
                llm,
            }
        }

        fn collaborators(&self) -> Collaborators {
            Collaborators::new(self.factory.clone(), self.fetcher.clone())
        }
    }

    fn test_config() -> AppConfig {
        AppConfig::with_llm(LlmConfig::new("test-model").with_temperature(0.0))
    }

    const PROMPT: &str = "Analyze the data from the JSON file";

    // -- tests ---------------------------------------------------------------

    #[tokio::test]
    async fn single_file_runs_with_json_key() {
        let harness = Harness::new(json!("Mocked answer"));
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "path/to/single/file.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        assert_eq!(scraper.input_key(), "json");
        assert_eq!(scraper.run().await.unwrap(), "Mocked answer");

        let calls = harness.fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "path/to/single/file.json");
        assert_eq!(calls[0].1.kind, InputKind::Single);

        let requests = harness.llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].question, PROMPT);
    }

    #[tokio::test]
    async fn directory_runs_with_json_dir_key() {
        let harness = Harness::new(json!("Mocked answer"));
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "path/to/json/directory",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        assert_eq!(scraper.input_key(), "json_dir");
        assert_eq!(scraper.run().await.unwrap(), "Mocked answer");
        assert_eq!(
            harness.fetcher.calls.lock().unwrap()[0].1.kind,
            InputKind::Collection
        );
    }

    #[tokio::test]
    async fn file_of_another_type_is_read_as_directory() {
        let harness = Harness::new(json!("ok"));
        let mut scraper = ScraperGraph::new(
            SourceType::Csv,
            PROMPT,
            "exports/data.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        assert_eq!(scraper.input_key(), "csv_dir");
        assert_eq!(
            scraper.initial_state().get_str("csv_dir"),
            Some("exports/data.json")
        );
        scraper.run().await.unwrap();
        let calls = harness.fetcher.calls.lock().unwrap();
        assert_eq!(calls[0].1.kind, InputKind::Collection);
        assert_eq!(calls[0].1.source_type, SourceType::Csv);
    }

    #[test]
    fn factory_receives_llm_config_once() {
        let harness = Harness::new(json!("ok"));
        let config = test_config();
        let _scraper = ScraperGraph::json(
            PROMPT,
            "data.json",
            &config,
            None,
            harness.collaborators(),
        )
        .unwrap();

        let configs = harness.factory.llm_configs.lock().unwrap();
        assert_eq!(*configs, vec![config.llm.clone()]);
        assert!(harness.factory.embedder_configs.lock().unwrap().is_empty());
    }

    #[test]
    fn initial_state_is_exactly_prompt_and_source() {
        let harness = Harness::new(json!("ok"));
        let scraper = ScraperGraph::json(
            PROMPT,
            "path/to/single/file.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        let seed = scraper.initial_state();
        assert_eq!(seed.keys().collect::<Vec<_>>(), vec!["user_prompt", "json"]);
        assert_eq!(seed.get_str("user_prompt"), Some(PROMPT));
        assert_eq!(seed.get_str("json"), Some("path/to/single/file.json"));
    }

    #[tokio::test]
    async fn null_answer_is_no_answer_error() {
        let harness = Harness::new(Value::Null);
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "data.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        let err = scraper.run().await.unwrap_err();
        assert!(matches!(err, ScrapeGraphError::NoAnswer));
        assert!(scraper.final_state().is_some());
    }

    #[tokio::test]
    async fn structured_answer_is_serialized() {
        let harness = Harness::new(json!({"names": ["Ada"]}));
        let schema = SchemaDescriptor::new("people", json!({"type": "object"}));
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "data.json",
            &test_config(),
            Some(schema.clone()),
            harness.collaborators(),
        )
        .unwrap();

        let answer = scraper.run().await.unwrap();
        let parsed: Value = serde_json::from_str(&answer).unwrap();
        assert_eq!(parsed, json!({"names": ["Ada"]}));
        assert_eq!(
            harness.llm.requests.lock().unwrap()[0].schema,
            Some(schema)
        );
    }

    #[tokio::test]
    async fn repeated_runs_use_independent_state() {
        let harness = Harness::new(json!("Mocked answer"));
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "data.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        scraper.run().await.unwrap();
        let first_state = scraper.final_state().cloned().unwrap();
        let first_run = scraper.execution_info().unwrap().run_id;

        scraper.run().await.unwrap();
        let second_state = scraper.final_state().cloned().unwrap();

        assert_eq!(first_state, second_state);
        assert_eq!(
            second_state.keys().collect::<Vec<_>>(),
            vec!["user_prompt", "json", "doc", "answer"]
        );
        assert_ne!(scraper.execution_info().unwrap().run_id, first_run);
        assert_eq!(harness.fetcher.calls.lock().unwrap().len(), 2);
        assert_eq!(harness.factory.llm_configs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execution_info_records_answer_usage() {
        let harness = Harness::new(json!("ok"));
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "data.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();
        scraper.run().await.unwrap();

        let info = scraper.execution_info().unwrap();
        assert_eq!(info.graph, "json_scraper");
        let names: Vec<&str> = info.nodes.iter().map(|n| n.node.as_str()).collect();
        assert_eq!(names, vec!["fetch", "generate_answer"]);
        assert_eq!(info.total_usage().total_tokens, 15);
    }

    #[tokio::test]
    async fn embedder_config_adds_retrieval_step() {
        let harness = Harness::new(json!("ok"));
        let mut config = test_config();
        config.embedder = Some(EmbedderConfig::new("test-embedder"));

        let mut scraper = ScraperGraph::json(
            PROMPT,
            "data.json",
            &config,
            None,
            harness.collaborators(),
        )
        .unwrap();

        assert_eq!(
            scraper.graph().node_names(),
            vec!["fetch", "rag", "generate_answer"]
        );
        assert_eq!(harness.factory.embedder_configs.lock().unwrap().len(), 1);

        scraper.run().await.unwrap();
        let state = scraper.final_state().unwrap();
        assert!(state.contains("relevant_chunks"));
    }

    #[test]
    fn factory_error_fails_construction() {
        let harness = Harness::build(json!("ok"), true, false);
        let result = ScraperGraph::json(
            PROMPT,
            "data.json",
            &test_config(),
            None,
            harness.collaborators(),
        );
        assert!(matches!(
            result,
            Err(ScrapeGraphError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_error_propagates_without_calling_llm() {
        let harness = Harness::build(json!("ok"), false, true);
        let mut scraper = ScraperGraph::json(
            PROMPT,
            "missing.json",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();

        let err = scraper.run().await.unwrap_err();
        assert!(matches!(err, ScrapeGraphError::SourceNotFound { .. }));
        assert!(harness.llm.requests.lock().unwrap().is_empty());
        assert!(scraper.final_state().is_none());
    }

    #[tokio::test]
    async fn cancelled_run_stops_before_fetch() {
        let harness = Harness::new(json!("ok"));
        let mut scraper = ScraperGraph::csv(
            "Sum the totals",
            "reports/",
            &test_config(),
            None,
            harness.collaborators(),
        )
        .unwrap();
        assert_eq!(scraper.input_key(), "csv_dir");

        let token = CancellationToken::new();
        token.cancel();
        let err = scraper
            .run_with(&RunOptions::default().with_cancel(token))
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeGraphError::Cancelled { .. }));
        assert!(harness.fetcher.calls.lock().unwrap().is_empty());
    }
}
