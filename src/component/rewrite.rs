//! Question rewriting.
//!
//! The model-backed rewrite path is disabled; the stage passes the query
//! through unchanged but still performs its history contract: after it runs,
//! the engine's most recent user turn holds exactly the (un)rewritten query,
//! which downstream stages rely on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::component::{
    Component, ComponentOutcome, GenerateParam, OutputSlot, RunOptions, StageContext,
};
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::OutputTable;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteQuestionParam {
    #[serde(flatten)]
    pub gen: GenerateParam,
    /// Target language code for the rewritten question.
    pub language: String,
}

impl Default for RewriteQuestionParam {
    fn default() -> Self {
        Self {
            gen: GenerateParam {
                temperature: 0.9,
                ..Default::default()
            },
            language: String::new(),
        }
    }
}

impl RewriteQuestionParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        self.gen.check()
    }
}

pub struct RewriteQuestion {
    id: String,
    param: RewriteQuestionParam,
    ctx: StageContext,
    slot: OutputSlot,
}

impl RewriteQuestion {
    pub fn new(id: &str, param: RewriteQuestionParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }
}

#[async_trait]
impl Component for RewriteQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "RewriteQuestion"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        _history: &[Message],
        _opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let query = self
            .get_input()
            .first()
            .map(|r| r.content.clone())
            .unwrap_or_default();

        info!(id = %self.id, "question rewrite backend disabled; passing the query through");
        self.ctx.engine.sync_user_turn(&query);

        let table = OutputTable::be_output(&query);
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
        match self.run(&[], RunOptions::default()).await? {
            ComponentOutcome::Finalized(table) => Ok(table),
            ComponentOutcome::Streaming(stream) => {
                let row = stream.drain().await?;
                Ok(OutputTable::from_rows(vec![row]))
            }
        }
    }
}
