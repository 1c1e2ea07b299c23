//! Binary relevance grading of retrieved documents against the user question.
//!
//! The grader call routes the upstream documents and the latest user question
//! through the chat backend with a fixed grading prompt, then maps the
//! backend's yes/no verdict onto the operator-configured branch values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::params::check_empty;
use crate::component::{
    Component, ComponentOutcome, GenerateParam, OutputSlot, RunOptions, StageContext,
};
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::OutputTable;

const GRADER_PROMPT: &str = "\
You are a grader assessing relevance of a retrieved document to a user question.
It does not need to be a stringent test. The goal is to filter out erroneous retrievals.
If the document contains keyword(s) or semantic meaning related to the user question, grade it as relevant.
Give a binary score 'yes' or 'no' score to indicate whether the document is relevant to the question.
No other words needed except 'yes' or 'no'.";

/// Rough character budget for a token-denominated context length, minus a
/// small margin for roles and prompt framing.
fn char_limit(max_length: usize) -> usize {
    max_length.saturating_mul(4).saturating_sub(20)
}

/// Char-safe truncation with a trailing ellipsis.
fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    let keep: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{keep}...")
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevantParam {
    #[serde(flatten)]
    pub gen: GenerateParam,
    /// Output when the grader says the documents are relevant.
    pub yes: String,
    /// Output when the grader says they are not (also the ambiguous fallback).
    pub no: String,
}

impl RelevantParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        self.gen.check()?;
        check_empty(&self.yes, "[Relevant] 'Yes'")?;
        check_empty(&self.no, "[Relevant] 'No'")?;
        Ok(())
    }
}

pub struct Relevant {
    id: String,
    param: RelevantParam,
    ctx: StageContext,
    slot: OutputSlot,
}

impl Relevant {
    pub fn new(id: &str, param: RelevantParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }

    async fn grade(&self, history: &[Message]) -> Result<OutputTable, ComponentError> {
        let question = history
            .iter()
            .rev()
            .find(|m| m.has_role(Message::USER))
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let documents = self.get_input().joined(" - ");
        if documents.trim().is_empty() {
            return Ok(OutputTable::be_output(&self.param.no));
        }

        let mut text = format!("Question: {question}\nDocuments: \n{documents}");
        let limit = char_limit(self.ctx.chat.max_length());
        if text.chars().count() > limit {
            warn!(
                id = %self.id,
                length = text.chars().count(),
                limit,
                "grader input exceeds estimated limit; truncating"
            );
            text = truncate_with_ellipsis(&text, limit);
        }

        let verdict = self
            .ctx
            .chat
            .chat(
                GRADER_PROMPT,
                &[Message::user(&text)],
                &self.param.gen.gen_conf(),
            )
            .await?;

        let lower = verdict.to_lowercase();
        if lower.contains("yes") {
            return Ok(OutputTable::be_output(&self.param.yes));
        }
        if lower.contains("no") {
            return Ok(OutputTable::be_output(&self.param.no));
        }
        warn!(id = %self.id, verdict = %verdict, "ambiguous grader verdict; defaulting to 'no'");
        Ok(OutputTable::be_output(&self.param.no))
    }
}

#[async_trait]
impl Component for Relevant {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "Relevant"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        history: &[Message],
        _opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let table = self.grade(history).await?;
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
        self.grade(&[]).await
    }
}
