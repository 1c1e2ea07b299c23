//! Knowledge retrieval with fan-in over independent sources.
//!
//! Sources are queried in a fixed order (graph-augmented source first, then
//! web search) and merged in that order so the result is deterministic. A
//! failing source is logged and skipped; it never fails the stage or discards
//! what other sources produced.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::component::params::{check_decimal_float, check_positive_number};
use crate::component::{Component, ComponentOutcome, OutputSlot, RunOptions, StageContext};
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::{OutputRow, OutputTable};
use crate::reference::{Chunk, RetrievalSet};

/// Upper bound on the rendered knowledge block, in characters.
const MAX_RENDERED_LEN: usize = 200_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParam {
    pub similarity_threshold: f32,
    pub keywords_similarity_weight: f32,
    pub top_n: i64,
    pub top_k: i64,
    pub rerank_id: String,
    /// Surfaced downstream when no source produced anything.
    pub empty_response: String,
    /// Whether to consult the graph-augmented source.
    pub use_kg: bool,
}

impl Default for RetrievalParam {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.2,
            keywords_similarity_weight: 0.5,
            top_n: 8,
            top_k: 1024,
            rerank_id: String::new(),
            empty_response: String::new(),
            use_kg: false,
        }
    }
}

impl RetrievalParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        check_decimal_float(self.similarity_threshold, "[Retrieval] Similarity threshold")?;
        check_decimal_float(
            self.keywords_similarity_weight,
            "[Retrieval] Keyword similarity weight",
        )?;
        check_positive_number(self.top_n, "[Retrieval] Top N")?;
        Ok(())
    }
}

pub struct Retrieval {
    id: String,
    param: RetrievalParam,
    ctx: StageContext,
    slot: OutputSlot,
}

/// Reduces a forwarded dialogue transcript to the final utterance: everything
/// before the last `USER:`/`ASSISTANT:` marker is dropped, then any leading
/// `user:` tag on what remains.
fn extract_query(text: &str) -> String {
    static MARKERS: OnceLock<Regex> = OnceLock::new();
    static LEADING_TAG: OnceLock<Regex> = OnceLock::new();
    let markers = MARKERS.get_or_init(|| Regex::new(r"(USER:|ASSISTANT:)").expect("literal pattern"));
    let leading =
        LEADING_TAG.get_or_init(|| Regex::new(r"(?i)^user[:：\s]*").expect("literal pattern"));

    let last = markers.split(text).last().unwrap_or(text);
    leading.replace(last, "").into_owned()
}

/// Renders sanitized chunks into one prompt-ready knowledge block, truncated
/// at `cap` characters.
fn render_knowledge(chunks: &[Chunk], cap: usize) -> String {
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let block = format!(
        "Relevant information from knowledge base:\n{}",
        contents.join("\n")
    );
    if block.chars().count() > cap {
        let truncated: String = block.chars().take(cap).collect();
        return format!("{truncated}...");
    }
    block
}

impl Retrieval {
    pub fn new(id: &str, param: RetrievalParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }

    /// The empty-result row: blank content, with the configured message (if
    /// any) carried alongside for the generation stage's short circuit.
    fn empty_row(&self) -> OutputRow {
        OutputRow {
            content: String::new(),
            empty_response: Some(self.param.empty_response.clone())
                .filter(|s| !s.trim().is_empty()),
            ..Default::default()
        }
    }

    async fn gather(&self, query: &str) -> RetrievalSet {
        let max_results = self.param.top_n.max(0) as usize;
        let mut merged = RetrievalSet::default();

        if self.param.use_kg {
            match &self.ctx.graph_source {
                Some(source) => match source.retrieve(query, max_results).await {
                    Ok(set) => merged.extend(set),
                    Err(err) => {
                        warn!(id = %self.id, error = %err, "graph-augmented source failed; continuing");
                    }
                },
                None => {
                    // No graph source deployed; flag a synthetic chunk so the
                    // canvas still shows where graph results would land.
                    info!(id = %self.id, "use_kg set without a graph source; inserting placeholder chunk");
                    let mut chunk = Chunk::new(
                        format!("Knowledge graph results for '{query}' are unavailable."),
                        "kg_placeholder",
                        "Knowledge Graph",
                    );
                    chunk.has_weighted_content = Some(true);
                    merged.chunks.insert(0, chunk);
                }
            }
        }

        if let Some(source) = &self.ctx.web_source {
            match source.retrieve(query, max_results).await {
                Ok(set) => merged.extend(set),
                Err(err) => {
                    warn!(id = %self.id, error = %err, "web source failed; continuing with other results");
                }
            }
        }

        merged
    }
}

#[async_trait]
impl Component for Retrieval {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "Retrieval"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        _history: &[Message],
        _opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let raw = self
            .get_input()
            .first()
            .map(|r| r.content.clone())
            .unwrap_or_default();
        let query = extract_query(&raw);

        let merged = self.gather(&query).await;

        if merged.is_empty() {
            info!(id = %self.id, "no chunks from any source");
            let table = OutputTable::from_rows(vec![self.empty_row()]);
            self.slot.set(table.clone());
            return Ok(ComponentOutcome::Finalized(table));
        }

        let sanitized: Vec<Chunk> = merged.chunks.iter().map(Chunk::sanitized).collect();
        let content = render_knowledge(&sanitized, MAX_RENDERED_LEN);
        let payload = serde_json::to_string(&sanitized)?;
        tracing::debug!(id = %self.id, chunks = sanitized.len(), "retrieval merged");

        let row = OutputRow {
            content,
            chunks: Some(payload),
            ..Default::default()
        };
        let table = OutputTable::from_rows(vec![row]);
        self.slot.set(table.clone());
        Ok(ComponentOutcome::Finalized(table))
    }

    fn get_input(&self) -> OutputTable {
        self.ctx.engine.get_input(&self.id)
    }

    fn output(&self, allow_partial: bool) -> Result<OutputTable, ComponentError> {
        self.slot.read(&self.id, allow_partial)
    }

    async fn debug(&self, inputs: &[(String, String)]) -> Result<OutputTable, ComponentError> {
        let query = inputs
            .iter()
            .find(|(k, _)| k == "user")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let merged = self.gather(&extract_query(&query)).await;
        if merged.is_empty() {
            return Ok(OutputTable::from_rows(vec![self.empty_row()]));
        }
        let sanitized: Vec<Chunk> = merged.chunks.iter().map(Chunk::sanitized).collect();
        let payload = serde_json::to_string(&sanitized)?;
        Ok(OutputTable::from_rows(vec![OutputRow {
            content: render_knowledge(&sanitized, MAX_RENDERED_LEN),
            chunks: Some(payload),
            ..Default::default()
        }]))
    }
}
