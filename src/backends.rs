//! Collaborator traits for external model and retrieval services.
//!
//! Every stage receives its backends by constructor injection so tests can
//! substitute deterministic fakes. The traits are deliberately narrow: the
//! pipeline core never sees provider SDKs, only these seams.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::message::Message;
use crate::reference::RetrievalSet;

/// Generation parameters forwarded to the chat backend.
///
/// Only explicitly configured values are set; the backend applies its own
/// defaults for `None` fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

/// A chat-completion backend.
///
/// Reports a context budget via [`max_length`](ChatBackend::max_length) and a
/// length estimate via [`count`](ChatBackend::count); budget fitting uses both
/// (see [`crate::prompt::fit_messages`]).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// The maximum context length this backend accepts, in `count` units.
    fn max_length(&self) -> usize;

    /// Length estimate for budget fitting. Character count by default;
    /// token-counting backends override this.
    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }

    /// Runs one synchronous chat completion.
    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        conf: &GenConfig,
    ) -> Result<String, BackendError>;

    /// Runs one chat completion as a stream of text increments.
    ///
    /// Each item is a delta to append to the accumulated answer.
    fn chat_streaming(
        &self,
        system: &str,
        messages: &[Message],
        conf: &GenConfig,
    ) -> BoxStream<'static, Result<String, BackendError>>;
}

/// A citation-insertion backend.
#[async_trait]
pub trait CitationBackend: Send + Sync {
    /// Annotates `answer` with citation markers against `contents` and returns
    /// the annotated text plus the indices of the chunks it actually used.
    #[allow(clippy::too_many_arguments)]
    async fn insert_citations(
        &self,
        answer: &str,
        contents: &[String],
        vectors: &[Vec<f32>],
        embedding_model: &str,
        keyword_weight: f32,
        vector_weight: f32,
    ) -> Result<(String, Vec<usize>), BackendError>;
}

/// A knowledge source: graph-augmented retrieval or an external web search.
///
/// Implementations must not panic across this boundary; the retrieval stage
/// catches `Err` results, logs them, and continues with whatever other sources
/// produced.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn retrieve(&self, query: &str, max_results: usize)
        -> Result<RetrievalSet, BackendError>;
}
