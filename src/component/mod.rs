//! The stage contract shared by every component type.
//!
//! A component is one typed processing unit in the workflow graph. All
//! components expose the same surface: activation-time validation
//! ([`Component::check`]), the core algorithm ([`Component::run`]) returning
//! either a finalized output table or a streaming producer, cached-output
//! access ([`Component::output`]), and an isolated-testing entry point
//! ([`Component::debug`]).

pub mod answer;
pub mod begin;
pub mod exesql;
pub mod generate;
pub mod params;
pub mod relevant;
pub mod retrieval;
pub mod rewrite;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::backends::{ChatBackend, CitationBackend, RetrievalBackend};
use crate::engine::ExecutionEngine;
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::OutputTable;
use crate::streaming::AnswerStream;

pub use answer::{Answer, AnswerParam};
pub use begin::{Begin, BeginParam};
pub use exesql::{ExeSql, ExeSqlParam};
pub use generate::{Generate, GenerateParam};
pub use relevant::{Relevant, RelevantParam};
pub use retrieval::{Retrieval, RetrievalParam};
pub use rewrite::{RewriteQuestion, RewriteQuestionParam};

/// Per-run options handed down by the execution engine.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Whether the caller wants incremental output. Stages stream only when
    /// this is set *and* their single downstream successor is an answer-type
    /// stage; otherwise they compute synchronously.
    pub stream: bool,
    /// Direct keyword inputs accumulated by the engine; seed the template
    /// variable map before graph resolution.
    pub vars: Vec<(String, String)>,
}

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id())
            .field("component_name", &self.component_name())
            .finish()
    }
}

/// What `run` hands back: a settled table, or a producer to drain.
pub enum ComponentOutcome {
    Finalized(OutputTable),
    Streaming(AnswerStream),
}

/// Every stage implements this contract.
#[async_trait]
pub trait Component: Send + Sync {
    /// The node id this stage instance is bound to.
    fn id(&self) -> &str;

    /// The component type tag (e.g. `"Generate"`).
    fn component_name(&self) -> &str;

    /// Runs parameter validation. Fails fast on the first violation with a
    /// field-qualified message; never mutates state.
    fn check(&self) -> Result<(), ConfigurationError>;

    /// Executes the stage's core algorithm for one conversational turn.
    async fn run(
        &self,
        history: &[Message],
        opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError>;

    /// The immediate upstream stage's cached output, via the engine.
    fn get_input(&self) -> OutputTable;

    /// This stage's cached result. With `allow_partial = false`, a result
    /// produced through streaming is only available once the stream has been
    /// drained to completion.
    fn output(&self, allow_partial: bool) -> Result<OutputTable, ComponentError>;

    /// Same algorithm as `run`, with inputs supplied directly instead of
    /// resolved from the graph. For isolated testing.
    async fn debug(&self, inputs: &[(String, String)]) -> Result<OutputTable, ComponentError>;
}

/// Shared handles injected into every stage at construction.
///
/// Backends are trait objects so tests substitute deterministic fakes without
/// any module-level shared state.
#[derive(Clone)]
pub struct StageContext {
    pub engine: Arc<dyn ExecutionEngine>,
    pub chat: Arc<dyn ChatBackend>,
    pub citation: Arc<dyn CitationBackend>,
    /// Graph-augmented retrieval source, when deployed.
    pub graph_source: Option<Arc<dyn RetrievalBackend>>,
    /// External web-search source, when configured.
    pub web_source: Option<Arc<dyn RetrievalBackend>>,
}

/// A stage's cached-output cell.
///
/// Tracks the streaming handshake: `begin_stream` marks the output pending
/// until the producer commits it via `set`. Reading with
/// `allow_partial = false` while pending is an error, which is how abandoning
/// a stream mid-way is surfaced to callers.
#[derive(Clone, Default)]
pub struct OutputSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    table: Option<OutputTable>,
    stream_pending: bool,
}

impl OutputSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits a settled output table, clearing any pending-stream mark.
    pub fn set(&self, table: OutputTable) {
        let mut state = self.inner.lock();
        state.table = Some(table);
        state.stream_pending = false;
    }

    /// Marks this slot as awaiting a stream's final item.
    pub fn begin_stream(&self) {
        self.inner.lock().stream_pending = true;
    }

    /// Reads the cached table. See [`Component::output`] for semantics.
    pub fn read(&self, id: &str, allow_partial: bool) -> Result<OutputTable, ComponentError> {
        let state = self.inner.lock();
        if state.stream_pending && !allow_partial {
            return Err(ComponentError::StreamNotDrained { id: id.to_string() });
        }
        state
            .table
            .clone()
            .ok_or_else(|| ComponentError::NoOutput { id: id.to_string() })
    }
}

/// Instantiates a stage for a graph node.
///
/// `name` must be a registered component type; `params` is the node's raw
/// parameter mapping. Unknown types and malformed parameter mappings are
/// activation-time failures.
pub fn build_component(
    name: &str,
    id: &str,
    params: &serde_json::Value,
    ctx: StageContext,
) -> Result<Box<dyn Component>, ConfigurationError> {
    fn parse<P: serde::de::DeserializeOwned>(
        name: &str,
        params: &serde_json::Value,
    ) -> Result<P, ConfigurationError> {
        serde_json::from_value(params.clone())
            .map_err(|e| ConfigurationError::new(format!("[{name}] invalid parameters: {e}")))
    }

    match name {
        "Begin" => Ok(Box::new(Begin::new(id, parse(name, params)?, ctx))),
        "Answer" => Ok(Box::new(Answer::new(id, parse(name, params)?, ctx))),
        "Generate" => Ok(Box::new(Generate::new(id, parse(name, params)?, ctx))),
        "Retrieval" => Ok(Box::new(Retrieval::new(id, parse(name, params)?, ctx))),
        "Relevant" => Ok(Box::new(Relevant::new(id, parse(name, params)?, ctx))),
        "RewriteQuestion" => Ok(Box::new(RewriteQuestion::new(id, parse(name, params)?, ctx))),
        "ExeSQL" => Ok(Box::new(ExeSql::new(id, parse(name, params)?, ctx))),
        other => Err(ConfigurationError::new(format!(
            "unknown component type '{other}'"
        ))),
    }
}
