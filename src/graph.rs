//! The workflow graph model: typed nodes, directed edges, and the wire-format
//! document used to exchange workflows with the execution engine.
//!
//! Authoring operations validate eagerly and fail with a [`GraphError`]
//! naming the offending node; none of them leave the graph in a partially
//! mutated state. Edge mutation is idempotent: connecting an already
//! connected pair is a no-op.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::GraphError;

/// The component types a graph accepts, extensible at runtime.
#[derive(Clone, Debug)]
pub struct ComponentRegistry {
    names: FxHashSet<String>,
}

impl ComponentRegistry {
    /// Built-in stage types.
    const BUILTIN: &'static [&'static str] = &[
        "Begin",
        "Answer",
        "Generate",
        "Retrieval",
        "Relevant",
        "RewriteQuestion",
        "ExeSQL",
    ];

    pub fn register(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self {
            names: Self::BUILTIN.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One node of a workflow graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkflowNode {
    pub component_name: String,
    /// Raw parameter mapping; its shape depends on the component type and is
    /// validated at stage construction, not here.
    pub params: Map<String, Value>,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
    /// Scopes this node inside an iteration construct, when set.
    pub parent_id: Option<String>,
}

/// A declarative pipeline: nodes, edges, and the engine-owned per-turn state
/// carried alongside them in the wire document.
#[derive(Clone, Debug, Default)]
pub struct WorkflowGraph {
    pub id: String,
    pub description: String,
    nodes: FxHashMap<String, WorkflowNode>,
    registry: ComponentRegistry,
    /// Transient sequences owned by the execution engine; round-tripped
    /// untouched.
    pub history: Vec<Value>,
    pub messages: Vec<Value>,
    pub reference: Vec<Value>,
    pub path: Vec<Value>,
    pub answer: Vec<Value>,
}

impl WorkflowGraph {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Makes an additional component type acceptable to `add_node`.
    pub fn register_component_type(&mut self, name: impl Into<String>) {
        self.registry.register(name);
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        component_name: impl Into<String>,
        params: Map<String, Value>,
    ) -> Result<(), GraphError> {
        let id = id.into();
        let component_name = component_name.into();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNodeId { id });
        }
        if !self.registry.contains(&component_name) {
            return Err(GraphError::UnknownComponentType {
                name: component_name,
            });
        }
        self.nodes.insert(
            id,
            WorkflowNode {
                component_name,
                params,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn require(&self, id: &str) -> Result<(), GraphError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound { id: id.to_string() })
        }
    }

    /// Adds the edge `upstream -> downstream`. Already-connected pairs are
    /// left untouched.
    pub fn connect(&mut self, upstream: &str, downstream: &str) -> Result<(), GraphError> {
        self.require(upstream)?;
        self.require(downstream)?;

        let up = self.nodes.get_mut(upstream).expect("checked above");
        if !up.downstream.iter().any(|d| d == downstream) {
            up.downstream.push(downstream.to_string());
        }
        let down = self.nodes.get_mut(downstream).expect("checked above");
        if !down.upstream.iter().any(|u| u == upstream) {
            down.upstream.push(upstream.to_string());
        }
        Ok(())
    }

    /// Removes the edge `upstream -> downstream`; absent edges are a no-op.
    pub fn disconnect(&mut self, upstream: &str, downstream: &str) -> Result<(), GraphError> {
        self.require(upstream)?;
        self.require(downstream)?;

        let up = self.nodes.get_mut(upstream).expect("checked above");
        up.downstream.retain(|d| d != downstream);
        let down = self.nodes.get_mut(downstream).expect("checked above");
        down.upstream.retain(|u| u != upstream);
        Ok(())
    }

    /// Removes a node together with every edge referencing it, and clears the
    /// parent pointer of any node scoped under it.
    pub fn remove_node(&mut self, id: &str) -> Result<(), GraphError> {
        self.require(id)?;
        self.nodes.remove(id);
        for node in self.nodes.values_mut() {
            node.upstream.retain(|u| u != id);
            node.downstream.retain(|d| d != id);
            if node.parent_id.as_deref() == Some(id) {
                node.parent_id = None;
            }
        }
        Ok(())
    }

    /// Merges `patch` into the node's parameter mapping, overwriting per key.
    pub fn set_parameters(&mut self, id: &str, patch: Map<String, Value>) -> Result<(), GraphError> {
        self.require(id)?;
        let node = self.nodes.get_mut(id).expect("checked above");
        for (key, value) in patch {
            node.params.insert(key, value);
        }
        Ok(())
    }

    pub fn set_parent(&mut self, id: &str, parent_id: Option<&str>) -> Result<(), GraphError> {
        self.require(id)?;
        if let Some(parent) = parent_id {
            self.require(parent)?;
        }
        let node = self.nodes.get_mut(id).expect("checked above");
        node.parent_id = parent_id.map(str::to_string);
        Ok(())
    }

    /// Serializes to the wire document. Component keys are emitted in sorted
    /// order so the output is byte-stable for a given graph.
    #[must_use]
    pub fn to_document(&self) -> WorkflowDocument {
        let components = self
            .nodes
            .iter()
            .map(|(id, node)| {
                (
                    id.clone(),
                    DocumentNode {
                        obj: DocumentObj {
                            component_name: node.component_name.clone(),
                            params: node.params.clone(),
                        },
                        downstream: node.downstream.clone(),
                        upstream: node.upstream.clone(),
                        parent_id: node.parent_id.clone().unwrap_or_default(),
                    },
                )
            })
            .collect();
        WorkflowDocument {
            components,
            history: self.history.clone(),
            messages: self.messages.clone(),
            reference: self.reference.clone(),
            path: self.path.clone(),
            answer: self.answer.clone(),
        }
    }

    /// Builds a graph from a wire document, validating that every referenced
    /// edge endpoint exists and every component type is registered.
    pub fn from_document(doc: &WorkflowDocument) -> Result<Self, GraphError> {
        let mut graph = Self::default();
        for (id, doc_node) in &doc.components {
            if !graph.registry.contains(&doc_node.obj.component_name) {
                return Err(GraphError::UnknownComponentType {
                    name: doc_node.obj.component_name.clone(),
                });
            }
            graph.nodes.insert(
                id.clone(),
                WorkflowNode {
                    component_name: doc_node.obj.component_name.clone(),
                    params: doc_node.obj.params.clone(),
                    upstream: doc_node.upstream.clone(),
                    downstream: doc_node.downstream.clone(),
                    parent_id: Some(doc_node.parent_id.clone()).filter(|p| !p.is_empty()),
                },
            );
        }
        for node in graph.nodes.values() {
            for referenced in node
                .upstream
                .iter()
                .chain(node.downstream.iter())
                .chain(node.parent_id.iter())
            {
                if !graph.nodes.contains_key(referenced) {
                    return Err(GraphError::NodeNotFound {
                        id: referenced.clone(),
                    });
                }
            }
        }
        graph.history = doc.history.clone();
        graph.messages = doc.messages.clone();
        graph.reference = doc.reference.clone();
        graph.path = doc.path.clone();
        graph.answer = doc.answer.clone();
        Ok(graph)
    }
}

/// Wire shape of one node: the nested `obj` layer is part of the exchange
/// format and is kept as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentObj {
    pub component_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub obj: DocumentObj,
    #[serde(default)]
    pub downstream: Vec<String>,
    #[serde(default)]
    pub upstream: Vec<String>,
    /// Empty string encodes "no parent" on the wire.
    #[serde(default)]
    pub parent_id: String,
}

/// The workflow exchange document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub components: BTreeMap<String, DocumentNode>,
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub reference: Vec<Value>,
    #[serde(default)]
    pub path: Vec<Value>,
    #[serde(default)]
    pub answer: Vec<Value>,
}
