//! The entry node of a workflow: holds the operator-facing query parameters
//! and opens the conversation with a configured prologue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentOutcome, OutputSlot, RunOptions, StageContext};
use crate::engine::QueryParam;
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::OutputTable;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BeginParam {
    /// Opening line surfaced when the entry node runs.
    pub prologue: String,
    /// Parameters captured at the entry node, referenced from templates as
    /// `{begin@key}`.
    pub query: Vec<QueryParam>,
}

impl Default for BeginParam {
    fn default() -> Self {
        Self {
            prologue: "Hi! I'm your assistant, what can I do for you?".to_string(),
            query: Vec::new(),
        }
    }
}

impl BeginParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

pub struct Begin {
    id: String,
    param: BeginParam,
    ctx: StageContext,
    slot: OutputSlot,
}

impl Begin {
    pub fn new(id: &str, param: BeginParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }
}

#[async_trait]
impl Component for Begin {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "Begin"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        _history: &[Message],
        _opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let table = OutputTable::be_output(&self.param.prologue);
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
        Ok(OutputTable::be_output(&self.param.prologue))
    }
}
