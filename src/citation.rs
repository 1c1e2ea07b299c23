//! Citation assembly: marker insertion and stable per-document deduplication.
//!
//! Citation is best-effort by contract. A missing, unparseable, or empty
//! chunk payload, or a citation-backend failure, degrades to the uncited
//! answer with an empty reference; it never fails the stage.

use std::sync::Arc;

use crate::backends::CitationBackend;
use crate::engine::ExecutionEngine;
use crate::output::{OutputRow, OutputTable};
use crate::reference::{doc_aggs_from_chunks, Chunk, Reference};

/// Keyword weight handed to the citation backend.
const KEYWORD_WEIGHT: f32 = 0.7;
/// Vector weight handed to the citation backend.
const VECTOR_WEIGHT: f32 = 0.3;

/// Appended when the backend response carries a credential-error marker.
const CREDENTIAL_HINT: &str =
    " Please set LLM API-Key in 'User Setting -> Model providers -> API-Key'";

/// Extracts the serialized chunk payload from the first retrieval row, if any.
pub(crate) fn parse_chunks(retrieval: &OutputTable) -> Vec<Chunk> {
    let Some(payload) = retrieval.first().and_then(|row| row.chunks.as_deref()) else {
        return Vec::new();
    };
    if payload.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Chunk>>(payload) {
        Ok(chunks) => chunks,
        Err(err) => {
            tracing::warn!(error = %err, "chunk payload is not a JSON chunk list; skipping citation");
            Vec::new()
        }
    }
}

/// Annotates `answer` with citations against the retrieval rows and attaches
/// the deduplicated reference payload.
pub(crate) async fn assemble(
    retrieval: &OutputTable,
    answer: String,
    backend: &Arc<dyn CitationBackend>,
    engine: &Arc<dyn ExecutionEngine>,
) -> OutputRow {
    let chunks = parse_chunks(retrieval);
    if chunks.is_empty() {
        tracing::warn!("no usable chunks for citation; returning uncited answer");
        return uncited(answer);
    }

    let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    // Raw vectors are sanitized out of the chunk payload upstream; the
    // backend recomputes similarity from the embedding model reference.
    let vectors: Vec<Vec<f32>> = chunks.iter().map(|_| vec![0.0]).collect();
    let embedding_model = engine.get_embedding_model().unwrap_or_default();

    let (mut annotated, used) = match backend
        .insert_citations(
            &answer,
            &contents,
            &vectors,
            &embedding_model,
            KEYWORD_WEIGHT,
            VECTOR_WEIGHT,
        )
        .await
    {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %err, "citation backend failed; returning uncited answer");
            return uncited(answer);
        }
    };

    let doc_aggs = doc_aggs_from_chunks(
        used.into_iter()
            .filter(|i| *i < chunks.len())
            .map(|i| &chunks[i]),
    );

    let sanitized: Vec<Chunk> = chunks.iter().map(Chunk::sanitized).collect();

    let lower = annotated.to_lowercase();
    if lower.contains("invalid key") || lower.contains("invalid api") {
        annotated.push_str(CREDENTIAL_HINT);
    }

    OutputRow {
        content: annotated,
        reference: Some(Reference {
            chunks: sanitized,
            doc_aggs,
        }),
        ..Default::default()
    }
}

fn uncited(answer: String) -> OutputRow {
    OutputRow {
        content: answer,
        reference: Some(Reference::empty()),
        ..Default::default()
    }
}
