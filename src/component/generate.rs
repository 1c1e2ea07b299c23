//! The answer-producing stage: resolves template dependencies, fits the
//! conversation to the backend's context budget, invokes the chat backend
//! (optionally as a stream), and attaches citations.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::backends::GenConfig;
use crate::citation;
use crate::component::params::{check_decimal_float, check_empty};
use crate::component::{Component, ComponentOutcome, OutputSlot, RunOptions, StageContext};
use crate::engine::ComponentInfo;
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::{OutputRow, OutputTable};
use crate::prompt;
use crate::reference::Reference;
use crate::streaming::{AnswerStream, FinishFn, PreparedChat};

/// Fallback when retrieval produced nothing and no stage configured its own
/// empty-response message.
pub(crate) const DEFAULT_EMPTY_RESPONSE: &str = "Nothing found in knowledgebase (mock response).";

/// Strips a leading chain-of-thought block (everything up to and including the
/// closing `</think>` tag) from a backend answer.
pub(crate) fn strip_reasoning(answer: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)^.*</think>").expect("literal pattern"));
    re.replace(answer, "").into_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateParam {
    /// Chat model reference, `name@factory` form.
    pub llm_id: String,
    /// The prompt template with `{...}` placeholders.
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Whether to run citation insertion when retrieval chunks are available.
    pub cite: bool,
    /// How many recent history entries participate in budget fitting.
    pub message_history_window_size: usize,
}

impl Default for GenerateParam {
    fn default() -> Self {
        Self {
            llm_id: String::new(),
            prompt: String::new(),
            max_tokens: 0,
            temperature: 0.0,
            top_p: 0.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            cite: true,
            message_history_window_size: 22,
        }
    }
}

impl GenerateParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        check_empty(&self.llm_id, "[Generate] LLM")?;
        check_decimal_float(self.temperature, "[Generate] Temperature")?;
        check_decimal_float(self.top_p, "[Generate] Top P")?;
        check_decimal_float(self.presence_penalty, "[Generate] Presence penalty")?;
        check_decimal_float(self.frequency_penalty, "[Generate] Frequency penalty")?;
        Ok(())
    }

    /// Only explicitly configured (non-zero) values are forwarded; the backend
    /// applies its own defaults otherwise.
    pub fn gen_conf(&self) -> GenConfig {
        GenConfig {
            max_tokens: (self.max_tokens > 0).then_some(self.max_tokens),
            temperature: (self.temperature > 0.0).then_some(self.temperature),
            top_p: (self.top_p > 0.0).then_some(self.top_p),
            presence_penalty: (self.presence_penalty > 0.0).then_some(self.presence_penalty),
            frequency_penalty: (self.frequency_penalty > 0.0).then_some(self.frequency_penalty),
        }
    }
}

pub struct Generate {
    id: String,
    param: GenerateParam,
    ctx: StageContext,
    slot: OutputSlot,
}

impl Generate {
    pub fn new(id: &str, param: GenerateParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }

    /// Resolves every template dependency into `vars` (graph-resolved values
    /// override same-key seeds) and collects the rows of every retrieval
    /// upstream for the empty check and citation.
    ///
    /// The returned flag records whether the template referenced any
    /// retrieval-type node at all, even one whose cached output is empty; the
    /// empty-retrieval short circuit applies only then.
    fn resolve_inputs(&self, vars: &mut Vec<(String, String)>) -> (OutputTable, bool) {
        let engine = self.ctx.engine.as_ref();
        let elements = prompt::input_elements(&self.param.prompt, engine);
        let mut retrieval_rows: Vec<OutputRow> = Vec::new();
        let mut has_retrieval_dep = false;

        for element in elements.iter().skip(1) {
            let value = if element.key.to_ascii_lowercase().starts_with("begin@") {
                let (node_id, key) = element
                    .key
                    .split_once('@')
                    .expect("begin-param keys contain '@'");
                match engine
                    .get_component(node_id)
                    .and_then(|c| c.query.iter().find(|p| p.key == key).cloned())
                {
                    Some(param) => param.value,
                    None => {
                        warn!(key = %element.key, "entry-node parameter not found; substituting empty");
                        String::new()
                    }
                }
            } else {
                match engine.get_component(&element.key) {
                    Some(component) => {
                        if component.component_name.eq_ignore_ascii_case("answer") {
                            self.ctx
                                .engine
                                .get_history(1)
                                .last()
                                .map(|m| m.content.clone())
                                .unwrap_or_default()
                        } else {
                            let out = component.output.unwrap_or_default();
                            if component.component_name.eq_ignore_ascii_case("retrieval") {
                                has_retrieval_dep = true;
                                retrieval_rows.extend(out.rows().iter().cloned());
                            }
                            out.bulleted()
                        }
                    }
                    None => {
                        warn!(key = %element.key, "dependency node not found; substituting empty");
                        String::new()
                    }
                }
            };
            match vars.iter_mut().find(|(k, _)| k == &element.key) {
                Some(slot) => slot.1 = value,
                None => vars.push((element.key.clone(), value)),
            }
        }

        (OutputTable::from_rows(retrieval_rows), has_retrieval_dep)
    }

    fn build_prompt(&self, vars: &[(String, String)]) -> String {
        let mut built = prompt::substitute(&self.param.prompt, vars);
        if built.contains("{input}") {
            built = prompt::substitute_generic_input(&built, &self.get_input().bulleted());
        }
        built
    }

    /// The configured empty-response message of the first retrieval row, else
    /// the built-in default.
    fn empty_message(retrieval: &OutputTable) -> String {
        retrieval
            .first()
            .and_then(|row| row.empty_response.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EMPTY_RESPONSE.to_string())
    }

    fn streams_to_answer(&self, opts: &RunOptions) -> bool {
        if !opts.stream {
            return false;
        }
        let downstream = self
            .ctx
            .engine
            .get_component(&self.id)
            .map(|c| c.downstream)
            .unwrap_or_default();
        downstream.len() == 1
            && self
                .ctx
                .engine
                .get_component_name(&downstream[0])
                .is_some_and(|name| name.eq_ignore_ascii_case("answer"))
    }
}

#[async_trait]
impl Component for Generate {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "Generate"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        _history: &[Message],
        opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let mut vars = opts.vars.clone();
        let (retrieval, has_retrieval_dep) = self.resolve_inputs(&mut vars);
        let retrieval_blank = has_retrieval_dep && retrieval.is_blank();
        let system_prompt = self.build_prompt(&vars);
        let history = self
            .ctx
            .engine
            .get_history(self.param.message_history_window_size);
        let conf = self.param.gen_conf();

        if self.streams_to_answer(&opts) {
            self.slot.begin_stream();

            // Evaluated before any backend contact, including stream setup.
            if retrieval_blank {
                info!(id = %self.id, "retrieval empty; short-circuiting stream");
                let row = OutputRow {
                    content: Self::empty_message(&retrieval),
                    reference: Some(Reference::empty()),
                    ..Default::default()
                };
                return Ok(ComponentOutcome::Streaming(AnswerStream::immediate(
                    self.slot.clone(),
                    row,
                )));
            }

            let (system, messages) = prompt::assemble_chat(
                &system_prompt,
                history,
                self.ctx.chat.max_length(),
                &|s| self.ctx.chat.count(s),
            );

            let engine = self.ctx.engine.clone();
            let citation_backend = self.ctx.citation.clone();
            let id = self.id.clone();
            let cite = self.param.cite;
            let info = ComponentInfo {
                prompt: system.clone(),
                messages: messages.clone(),
                conf: conf.clone(),
            };
            let finish: FinishFn = Box::new(move |answer: String| {
                Box::pin(async move {
                    engine.set_component_info(&id, info);
                    if cite && !citation::parse_chunks(&retrieval).is_empty() {
                        citation::assemble(&retrieval, answer, &citation_backend, &engine).await
                    } else {
                        OutputRow::text(answer)
                    }
                })
            });

            let prepared = PreparedChat {
                chat: self.ctx.chat.clone(),
                system,
                messages,
                conf,
            };
            return Ok(ComponentOutcome::Streaming(AnswerStream::chat(
                self.slot.clone(),
                prepared,
                finish,
            )));
        }

        if retrieval_blank {
            info!(id = %self.id, "retrieval empty; returning configured empty response");
            let row = OutputRow {
                content: Self::empty_message(&retrieval),
                reference: Some(Reference::empty()),
                ..Default::default()
            };
            let table = OutputTable::from_rows(vec![row]);
            self.slot.set(table.clone());
            return Ok(ComponentOutcome::Finalized(table));
        }

        let (system, messages) =
            prompt::assemble_chat(&system_prompt, history, self.ctx.chat.max_length(), &|s| {
                self.ctx.chat.count(s)
            });
        let answer = self.ctx.chat.chat(&system, &messages, &conf).await?;
        let answer = strip_reasoning(&answer);
        self.ctx.engine.set_component_info(
            &self.id,
            ComponentInfo {
                prompt: system,
                messages,
                conf,
            },
        );

        let table = if self.param.cite && !citation::parse_chunks(&retrieval).is_empty() {
            let row =
                citation::assemble(&retrieval, answer, &self.ctx.citation, &self.ctx.engine).await;
            OutputTable::from_rows(vec![row])
        } else {
            OutputTable::be_output(&answer)
        };
        self.slot.set(table.clone());
        Ok(ComponentOutcome::Finalized(table))
    }

    fn get_input(&self) -> OutputTable {
        self.ctx.engine.get_input(&self.id)
    }

    fn output(&self, allow_partial: bool) -> Result<OutputTable, ComponentError> {
        self.slot.read(&self.id, allow_partial)
    }

    async fn debug(&self, inputs: &[(String, String)]) -> Result<OutputTable, ComponentError> {
        let mut system = self.param.prompt.clone();
        for (key, value) in inputs {
            if key == prompt::USER_INPUT_KEY {
                continue;
            }
            system = prompt::substitute(&system, &[(key.clone(), value.clone())]);
        }
        let question = inputs
            .iter()
            .find(|(k, _)| k == prompt::USER_INPUT_KEY)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| prompt::DEFAULT_USER_TURN.to_string());
        let answer = self
            .ctx
            .chat
            .chat(&system, &[Message::user(&question)], &self.param.gen_conf())
            .await?;
        Ok(OutputTable::be_output(&strip_reasoning(&answer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_prefix_is_stripped() {
        assert_eq!(
            strip_reasoning("<think>step by step</think>The answer."),
            "The answer."
        );
        assert_eq!(strip_reasoning("plain answer"), "plain answer");
    }

    #[test]
    fn gen_conf_forwards_only_configured_values() {
        let param = GenerateParam {
            temperature: 0.2,
            ..Default::default()
        };
        let conf = param.gen_conf();
        assert_eq!(conf.temperature, Some(0.2));
        assert_eq!(conf.max_tokens, None);
        assert_eq!(conf.top_p, None);
    }

    #[test]
    fn check_requires_model_and_sane_floats() {
        assert!(GenerateParam::default().check().is_err());
        let ok = GenerateParam {
            llm_id: "m@f".into(),
            ..Default::default()
        };
        assert!(ok.check().is_ok());
        let bad = GenerateParam {
            llm_id: "m@f".into(),
            temperature: 1.5,
            ..Default::default()
        };
        assert!(bad.check().is_err());
    }
}
