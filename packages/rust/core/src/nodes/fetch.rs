//! Fetch step: resolves the source descriptor from state and loads documents.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use scrapegraph_graph::{KeyExpr, Node, NodeContext, NodeOutcome, State, resolve_inputs};
use scrapegraph_shared::{
    FetchCapability, InputKey, InputKind, Result, ScrapeGraphError, SourceType,
};

use super::DOC_KEY;

/// Reads `<type>` or `<type>_dir` and writes the loaded documents to `doc`.
pub struct FetchNode {
    source_type: SourceType,
    input: KeyExpr,
    output: Vec<String>,
    fetcher: Arc<dyn FetchCapability>,
}

impl FetchNode {
    pub fn new(source_type: SourceType, fetcher: Arc<dyn FetchCapability>) -> Self {
        let input = KeyExpr::Any(
            InputKey::variants(source_type)
                .into_iter()
                .map(KeyExpr::Key)
                .collect(),
        );
        Self {
            source_type,
            input,
            output: vec![DOC_KEY.to_string()],
            fetcher,
        }
    }

    /// Map a resolved state key back to the input key it names.
    fn input_key_for(&self, key: &str) -> Result<InputKey> {
        [InputKind::Single, InputKind::Collection]
            .into_iter()
            .map(|kind| InputKey::new(self.source_type, kind))
            .find(|candidate| candidate.name() == key)
            .ok_or_else(|| {
                ScrapeGraphError::wiring(format!("fetch cannot read state key '{key}'"))
            })
    }
}

#[async_trait]
impl Node for FetchNode {
    fn name(&self) -> &str {
        "fetch"
    }

    fn input(&self) -> &KeyExpr {
        &self.input
    }

    fn output(&self) -> &[String] {
        &self.output
    }

    #[instrument(skip_all, fields(node = "fetch"))]
    async fn execute(&self, mut state: State, _ctx: &mut NodeContext) -> Result<NodeOutcome> {
        let keys = resolve_inputs(self, &state)?;
        let key = keys
            .first()
            .ok_or_else(|| ScrapeGraphError::wiring("fetch resolved no input key"))?;
        let input_key = self.input_key_for(key)?;

        let source = state.get_str(key).ok_or_else(|| {
            ScrapeGraphError::wiring(format!("state key '{key}' must hold a source path string"))
        })?;

        let documents = self.fetcher.fetch(source, input_key).await?;
        info!(%input_key, documents = documents.len(), "fetched source");

        state.insert_serialized(DOC_KEY, &documents)?;
        Ok(NodeOutcome::Continue(state))
    }
}
