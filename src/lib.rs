//! ragcanvas: declarative conversational-AI pipeline graphs.
//!
//! An operator describes a multi-step pipeline as a graph of typed stages (a
//! [workflow document](crate::graph::WorkflowDocument)); an execution engine
//! advances that graph one conversational turn at a time. This crate provides
//! the stage contract and the prompt/context-resolution pipeline:
//!
//! - [`graph`]: the workflow graph model, its authoring operations, and the
//!   wire-format document.
//! - [`component`]: the stage contract plus the built-in stage types
//!   (entry/answer anchors, generation, retrieval, relevance grading,
//!   question rewrite, SQL extraction).
//! - [`prompt`]: `{...}` placeholder extraction, variable substitution, and
//!   context-budget fitting with structural guarantees.
//! - [`reference`]: the citation payload attached to answers; insertion
//!   bookkeeping itself is internal to the generation stage.
//! - [`streaming`]: the pull-based incremental answer producer.
//! - [`backends`] and [`engine`]: the narrow collaborator interfaces through
//!   which stages reach model services and the execution engine.
//!
//! # Example
//!
//! ```
//! use ragcanvas::graph::WorkflowGraph;
//! use serde_json::Map;
//!
//! let mut graph = WorkflowGraph::new("demo", "retrieval-augmented answering");
//! graph.add_node("begin", "Begin", Map::new()).unwrap();
//! graph.add_node("kb1", "Retrieval", Map::new()).unwrap();
//! graph.add_node("gen:0", "Generate", Map::new()).unwrap();
//! graph.add_node("answer:0", "Answer", Map::new()).unwrap();
//! graph.connect("begin", "kb1").unwrap();
//! graph.connect("kb1", "gen:0").unwrap();
//! graph.connect("gen:0", "answer:0").unwrap();
//!
//! let document = graph.to_document();
//! let restored = WorkflowGraph::from_document(&document).unwrap();
//! assert_eq!(restored.to_document(), document);
//! ```

pub mod backends;
pub(crate) mod citation;
pub mod component;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod message;
pub mod output;
pub mod prompt;
pub mod reference;
pub mod streaming;
pub mod telemetry;
