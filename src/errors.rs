//! Error taxonomy for the ragcanvas pipeline.
//!
//! Three layers of failure are kept apart on purpose:
//!
//! - [`GraphError`]: workflow-authoring mistakes, fatal to the requested
//!   graph operation only.
//! - [`ConfigurationError`]: parameter validation failures raised once at
//!   activation time by `check()`, never at run time.
//! - [`ComponentError`]: run-time failures of a stage. Retrieval and citation
//!   paths degrade locally instead of surfacing here; the generation call is
//!   the one place a backend failure is allowed to propagate.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by workflow graph authoring operations.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum GraphError {
    /// A node with this id already exists in the graph.
    #[error("duplicate node id: '{id}'")]
    #[diagnostic(
        code(ragcanvas::graph::duplicate_node_id),
        help("Node ids must be unique within a workflow graph.")
    )]
    DuplicateNodeId { id: String },

    /// A referenced node id is not present in the graph.
    #[error("node not found: '{id}'")]
    #[diagnostic(code(ragcanvas::graph::node_not_found))]
    NodeNotFound { id: String },

    /// The component type tag is not in the registry.
    #[error("unknown component type: '{name}'")]
    #[diagnostic(
        code(ragcanvas::graph::unknown_component_type),
        help("Register custom component types before adding nodes of that type.")
    )]
    UnknownComponentType { name: String },
}

/// Activation-time parameter validation failure.
///
/// Carries a field-qualified message such as
/// `"[Generate] Temperature should be a float between 0 and 1"`.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(ragcanvas::component::configuration))]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A failure reported by an external backend collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    #[error("chat backend error: {0}")]
    #[diagnostic(code(ragcanvas::backend::chat))]
    Chat(String),

    #[error("retrieval backend error: {0}")]
    #[diagnostic(code(ragcanvas::backend::retrieval))]
    Retrieval(String),

    #[error("citation backend error: {0}")]
    #[diagnostic(code(ragcanvas::backend::citation))]
    Citation(String),
}

/// Run-time failure of a pipeline stage.
#[derive(Debug, Error, Diagnostic)]
pub enum ComponentError {
    /// Parameter validation failed during `check()`.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigurationError),

    /// A backend failure that the stage is allowed to propagate
    /// (the generation call only; retrieval and citation degrade locally).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    /// `output(false)` was called while a stream produced by `run` has not
    /// been drained to its final item yet.
    #[error("output of component '{id}' is not settled: stream not drained")]
    #[diagnostic(
        code(ragcanvas::component::stream_not_drained),
        help("Drain the AnswerStream to completion, or pass allow_partial = true.")
    )]
    StreamNotDrained { id: String },

    /// The component has not produced any cached output yet.
    #[error("component '{id}' has no cached output")]
    #[diagnostic(code(ragcanvas::component::no_output))]
    NoOutput { id: String },

    /// A result payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    #[diagnostic(code(ragcanvas::component::serde))]
    Serde(#[from] serde_json::Error),
}
