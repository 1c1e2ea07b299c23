//! Citation payload model: retrieved chunks, per-document aggregates, and the
//! `Reference` structure attached to generated answers.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chunk fields that never leave the crate: raw vectors and tokenized content
/// are dropped before a chunk is exposed as part of a [`Reference`].
const INTERNAL_CHUNK_FIELDS: &[&str] = &["vector", "content_ltks"];

/// One retrieved fragment of a source document.
///
/// Provider-specific fields land in `extra` and survive serialization, so a
/// web-search source can attach e.g. a URL without the core model knowing
/// about it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The fragment text.
    #[serde(default)]
    pub content: String,
    /// Source document id.
    #[serde(default)]
    pub doc_id: String,
    /// Human-readable document name.
    #[serde(default)]
    pub doc_name: String,
    /// Set when the content carries pre-weighted markup (graph-augmented
    /// sources flag their synthetic chunks this way).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_weighted_content: Option<bool>,
    /// Any additional provider fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Chunk {
    /// Creates a chunk with just the three core fields.
    pub fn new(
        content: impl Into<String>,
        doc_id: impl Into<String>,
        doc_name: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            doc_id: doc_id.into(),
            doc_name: doc_name.into(),
            ..Default::default()
        }
    }

    /// Returns a copy fit for exposure as reference material: internal-only
    /// fields are dropped and compound extra values are coerced to text.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        for field in INTERNAL_CHUNK_FIELDS {
            out.extra.remove(*field);
        }
        for (_, value) in out.extra.iter_mut() {
            if value.is_array() || value.is_object() {
                *value = Value::String(value.to_string());
            }
        }
        out
    }
}

/// Per-document aggregate: one entry per unique `doc_id`, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocAgg {
    pub doc_id: String,
    pub doc_name: String,
}

/// The structured citation payload attached to a generated answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub chunks: Vec<Chunk>,
    pub doc_aggs: Vec<DocAgg>,
}

impl Reference {
    /// An empty reference (no chunks, no aggregates).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A merged result set from one or more retrieval sources.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSet {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub doc_aggs: Vec<DocAgg>,
}

impl RetrievalSet {
    /// Appends another set, keeping this set's chunks first.
    pub fn extend(&mut self, other: RetrievalSet) {
        self.chunks.extend(other.chunks);
        self.doc_aggs.extend(other.doc_aggs);
    }

    /// True when no source contributed any chunk.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Builds the per-document aggregate list for a chunk sequence: one entry per
/// unique `doc_id`, created the first time that id is seen.
#[must_use]
pub fn doc_aggs_from_chunks<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Vec<DocAgg> {
    let mut seen = FxHashSet::default();
    let mut aggs = Vec::new();
    for chunk in chunks {
        if seen.insert(chunk.doc_id.clone()) {
            aggs.push(DocAgg {
                doc_id: chunk.doc_id.clone(),
                doc_name: chunk.doc_name.clone(),
            });
        }
    }
    aggs
}
