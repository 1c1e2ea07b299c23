//! The user-facing surfacing point of a workflow.
//!
//! An answer node carries no algorithm of its own: it anchors where upstream
//! output reaches the conversation, and its presence as the sole downstream
//! successor is what lets a generating stage stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentOutcome, OutputSlot, RunOptions, StageContext};
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::OutputTable;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerParam {}

impl AnswerParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

pub struct Answer {
    id: String,
    param: AnswerParam,
    ctx: StageContext,
    slot: OutputSlot,
}

impl Answer {
    pub fn new(id: &str, param: AnswerParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }
}

#[async_trait]
impl Component for Answer {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "Answer"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        _history: &[Message],
        _opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let table = self.get_input();
        self.slot.set(table.clone());
        Ok(ComponentOutcome::Finalized(table))
    }

    fn get_input(&self) -> OutputTable {
        self.ctx.engine.get_input(&self.id)
    }

    fn output(&self, allow_partial: bool) -> Result<OutputTable, ComponentError> {
        self.slot.read(&self.id, allow_partial)
    }

    async fn debug(&self, _inputs: &[(String, String)]) -> Result<OutputTable, ComponentError> {
        Ok(self.get_input())
    }
}
