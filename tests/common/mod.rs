//! Deterministic in-memory fakes shared by the integration tests.
//!
//! Every collaborator a stage touches has a fake here: the execution engine,
//! the chat backend (scripted sync reply plus scripted stream deltas, with a
//! call counter for zero-backend-call assertions), the citation backend, and
//! retrieval sources that either return a fixed set or fail on demand.

// Each test binary uses a different subset of these fakes.
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ragcanvas::backends::{
    ChatBackend, CitationBackend, GenConfig, RetrievalBackend,
};
use ragcanvas::component::StageContext;
use ragcanvas::engine::{ComponentInfo, EngineComponent, ExecutionEngine};
use ragcanvas::errors::BackendError;
use ragcanvas::message::Message;
use ragcanvas::output::OutputTable;
use ragcanvas::reference::RetrievalSet;

#[derive(Default)]
struct EngineState {
    components: FxHashMap<String, EngineComponent>,
    history: Vec<Message>,
    inputs: FxHashMap<String, OutputTable>,
    infos: FxHashMap<String, ComponentInfo>,
    embedding_model: Option<String>,
}

/// In-memory execution engine.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(self, id: &str, component: EngineComponent) -> Self {
        self.state
            .lock()
            .components
            .insert(id.to_string(), component);
        self
    }

    pub fn with_history(self, history: Vec<Message>) -> Self {
        self.state.lock().history = history;
        self
    }

    pub fn with_input(self, id: &str, input: OutputTable) -> Self {
        self.state.lock().inputs.insert(id.to_string(), input);
        self
    }

    pub fn history(&self) -> Vec<Message> {
        self.state.lock().history.clone()
    }

    pub fn info(&self, id: &str) -> Option<ComponentInfo> {
        self.state.lock().infos.get(id).cloned()
    }
}

impl ExecutionEngine for FakeEngine {
    fn get_component(&self, id: &str) -> Option<EngineComponent> {
        self.state.lock().components.get(id).cloned()
    }

    fn get_history(&self, window: usize) -> Vec<Message> {
        let state = self.state.lock();
        let len = state.history.len();
        state.history[len.saturating_sub(window)..].to_vec()
    }

    fn get_input(&self, id: &str) -> OutputTable {
        self.state.lock().inputs.get(id).cloned().unwrap_or_default()
    }

    fn set_component_info(&self, id: &str, info: ComponentInfo) {
        self.state.lock().infos.insert(id.to_string(), info);
    }

    fn get_tenant_id(&self) -> String {
        "tenant-test".to_string()
    }

    fn get_embedding_model(&self) -> Option<String> {
        self.state.lock().embedding_model.clone()
    }

    fn set_embedding_model(&self, id: &str) {
        self.state.lock().embedding_model = Some(id.to_string());
    }

    fn sync_user_turn(&self, content: &str) {
        let mut state = self.state.lock();
        match state.history.last() {
            Some(last) if last.has_role(Message::USER) && last.content == content => {}
            Some(last) if last.has_role(Message::USER) => {
                state.history.pop();
                state.history.push(Message::user(content));
            }
            _ => state.history.push(Message::user(content)),
        }
    }
}

/// Scripted chat backend.
pub struct FakeChat {
    pub reply: String,
    pub deltas: Vec<String>,
    pub max_length: usize,
    calls: AtomicUsize,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            deltas: vec![reply.to_string()],
            max_length: 8192,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_deltas(mut self, deltas: &[&str]) -> Self {
        self.deltas = deltas.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    fn max_length(&self) -> usize {
        self.max_length
    }

    async fn chat(
        &self,
        _system: &str,
        _messages: &[Message],
        _conf: &GenConfig,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    fn chat_streaming(
        &self,
        _system: &str,
        _messages: &[Message],
        _conf: &GenConfig,
    ) -> BoxStream<'static, Result<String, BackendError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let deltas = self.deltas.clone();
        Box::pin(async_stream::stream! {
            for delta in deltas {
                yield Ok(delta);
            }
        })
    }
}

/// Citation backend that appends a fixed marker and reports scripted indices.
pub struct FakeCitation {
    pub used: Vec<usize>,
    pub fail: bool,
}

impl FakeCitation {
    pub fn using(used: &[usize]) -> Self {
        Self {
            used: used.to_vec(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            used: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl CitationBackend for FakeCitation {
    async fn insert_citations(
        &self,
        answer: &str,
        _contents: &[String],
        _vectors: &[Vec<f32>],
        _embedding_model: &str,
        _keyword_weight: f32,
        _vector_weight: f32,
    ) -> Result<(String, Vec<usize>), BackendError> {
        if self.fail {
            return Err(BackendError::Citation("scripted failure".to_string()));
        }
        Ok((format!("{answer} ##0$$"), self.used.clone()))
    }
}

/// Retrieval source returning a fixed set, or failing on demand.
pub struct FakeRetrieval {
    pub set: RetrievalSet,
    pub fail: bool,
    calls: AtomicUsize,
}

impl FakeRetrieval {
    pub fn returning(set: RetrievalSet) -> Self {
        Self {
            set,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            set: RetrievalSet::default(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalBackend for FakeRetrieval {
    async fn retrieve(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<RetrievalSet, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BackendError::Retrieval("scripted failure".to_string()));
        }
        Ok(self.set.clone())
    }
}

/// A stage context wired to the given fakes; retrieval sources default to
/// none.
pub fn stage_context(engine: Arc<FakeEngine>, chat: Arc<FakeChat>) -> StageContext {
    StageContext {
        engine,
        chat,
        citation: Arc::new(FakeCitation::using(&[])),
        graph_source: None,
        web_source: None,
    }
}
