//! Pull-based incremental answer delivery.
//!
//! Streaming is modeled as an explicit iterator-like producer rather than a
//! language-level generator so that cancellation and "drained vs. not" are
//! explicit states. Each [`AnswerStream::next`] call may await one backend
//! increment. The stage's cached output commits only when the stream reaches
//! its [`StreamItem::Final`] item; a caller that abandons the stream earlier
//! has observed work that was never committed.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

use crate::backends::{ChatBackend, GenConfig};
use crate::component::OutputSlot;
use crate::errors::{BackendError, ComponentError};
use crate::message::Message;
use crate::output::{OutputRow, OutputTable};
use crate::reference::Reference;

/// One item pulled from an [`AnswerStream`].
#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    /// The accumulated answer text so far.
    Partial { content: String },
    /// The settled answer with its citation payload. Always the last item.
    Final {
        content: String,
        reference: Reference,
    },
}

/// A chat call prepared but not yet issued; the backend is contacted on the
/// first pull, not at stream construction.
pub(crate) struct PreparedChat {
    pub chat: Arc<dyn ChatBackend>,
    pub system: String,
    pub messages: Vec<Message>,
    pub conf: GenConfig,
}

/// Finalization step run after the backend stream is exhausted: records
/// component info and performs citation assembly. Must not fail; citation
/// problems degrade to an uncited row.
pub(crate) type FinishFn = Box<dyn FnOnce(String) -> BoxFuture<'static, OutputRow> + Send>;

enum StreamState {
    /// Short-circuit result: a single `Final` item, no backend involved.
    Immediate(Box<OutputRow>),
    /// Backend not yet contacted.
    Pending {
        prepared: PreparedChat,
        finish: Option<FinishFn>,
    },
    /// Increments flowing.
    Flowing {
        increments: BoxStream<'static, Result<String, BackendError>>,
        acc: String,
        finish: Option<FinishFn>,
    },
    Done,
}

/// A finite producer of partial answers ending in exactly one `Final` item.
pub struct AnswerStream {
    slot: OutputSlot,
    state: StreamState,
}

impl AnswerStream {
    /// A stream that yields one `Final` item without contacting any backend
    /// (the empty-retrieval short circuit).
    pub(crate) fn immediate(slot: OutputSlot, row: OutputRow) -> Self {
        Self {
            slot,
            state: StreamState::Immediate(Box::new(row)),
        }
    }

    pub(crate) fn chat(slot: OutputSlot, prepared: PreparedChat, finish: FinishFn) -> Self {
        Self {
            slot,
            state: StreamState::Pending {
                prepared,
                finish: Some(finish),
            },
        }
    }

    /// Pulls the next item. Returns `None` once the stream is exhausted.
    ///
    /// A backend failure mid-stream surfaces as `Some(Err(..))` and ends the
    /// stream without committing any output.
    pub async fn next(&mut self) -> Option<Result<StreamItem, ComponentError>> {
        loop {
            match std::mem::replace(&mut self.state, StreamState::Done) {
                StreamState::Immediate(row) => {
                    let item = Self::commit(&self.slot, *row);
                    return Some(Ok(item));
                }
                StreamState::Pending { prepared, finish } => {
                    let increments = prepared.chat.chat_streaming(
                        &prepared.system,
                        &prepared.messages,
                        &prepared.conf,
                    );
                    self.state = StreamState::Flowing {
                        increments,
                        acc: String::new(),
                        finish,
                    };
                }
                StreamState::Flowing {
                    mut increments,
                    mut acc,
                    mut finish,
                } => match increments.next().await {
                    Some(Ok(delta)) => {
                        acc.push_str(&delta);
                        let content = acc.clone();
                        self.state = StreamState::Flowing {
                            increments,
                            acc,
                            finish,
                        };
                        return Some(Ok(StreamItem::Partial { content }));
                    }
                    Some(Err(err)) => {
                        return Some(Err(ComponentError::Backend(err)));
                    }
                    None => {
                        let finish = finish.take().expect("finish runs once");
                        let row = finish(acc).await;
                        let item = Self::commit(&self.slot, row);
                        return Some(Ok(item));
                    }
                },
                StreamState::Done => return None,
            }
        }
    }

    /// Consumes the stream to completion and returns the final row.
    pub async fn drain(mut self) -> Result<OutputRow, ComponentError> {
        let mut last: Option<OutputRow> = None;
        while let Some(item) = self.next().await {
            if let StreamItem::Final { content, reference } = item? {
                last = Some(OutputRow {
                    content,
                    reference: Some(reference),
                    ..Default::default()
                });
            }
        }
        last.ok_or_else(|| ComponentError::NoOutput {
            id: "<stream>".to_string(),
        })
    }

    fn commit(slot: &OutputSlot, row: OutputRow) -> StreamItem {
        let item = StreamItem::Final {
            content: row.content.clone(),
            reference: row.reference.clone().unwrap_or_default(),
        };
        slot.set(OutputTable::from_rows(vec![row]));
        item
    }
}
