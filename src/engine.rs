//! The execution-engine collaborator interface.
//!
//! The engine owns the workflow graph and all per-turn mutable state: the
//! conversation history, the execution path, and every stage's cached output.
//! Stages never mutate that state directly; they read through this trait and
//! hand results back from `run`. Only the engine mutates, and only between
//! stage invocations, so no locking discipline is needed inside stages.

use serde::{Deserialize, Serialize};

use crate::backends::GenConfig;
use crate::message::Message;
use crate::output::OutputTable;

/// One entry of the entry node's query-parameter list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub key: String,
    /// Human label shown to the operator.
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// The engine's read-only view of one graph node, as consumed by stages.
#[derive(Clone, Debug, Default)]
pub struct EngineComponent {
    pub component_name: String,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
    /// The node's cached output, if it has run this turn.
    pub output: Option<OutputTable>,
    /// Query parameters; populated for the entry node only.
    pub query: Vec<QueryParam>,
}

/// Diagnostic record a generation stage leaves behind after a backend call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub prompt: String,
    pub messages: Vec<Message>,
    pub conf: GenConfig,
}

/// Interface every stage uses to talk to the execution engine.
///
/// Implementations live outside this crate (the engine is an external
/// collaborator); tests use an in-memory fake.
pub trait ExecutionEngine: Send + Sync {
    /// Looks up a node by id. `None` when the id does not name a node.
    fn get_component(&self, id: &str) -> Option<EngineComponent>;

    /// The component type tag of a node, if it exists.
    fn get_component_name(&self, id: &str) -> Option<String> {
        self.get_component(id).map(|c| c.component_name)
    }

    /// The most recent `window` history entries, oldest first.
    fn get_history(&self, window: usize) -> Vec<Message>;

    /// The immediate upstream stage's cached output for the node `id`.
    /// Empty table when there is no upstream or it has not run.
    fn get_input(&self, id: &str) -> OutputTable;

    /// Records the prompt/messages/config a generation stage actually sent.
    fn set_component_info(&self, id: &str, info: ComponentInfo);

    /// Tenant scoping for backend calls.
    fn get_tenant_id(&self) -> String;

    /// The embedding model reference used by citation insertion, if set.
    fn get_embedding_model(&self) -> Option<String>;

    /// Overrides the embedding model reference for subsequent citation calls.
    fn set_embedding_model(&self, id: &str);

    /// Hands ownership of the most recent user-turn slot to the caller: if the
    /// trailing history entry is a user turn with different content, it is
    /// replaced by `content`; otherwise a user turn is appended (no-op when it
    /// already matches). The question-rewrite stage relies on this invariant.
    fn sync_user_turn(&self, content: &str);
}
