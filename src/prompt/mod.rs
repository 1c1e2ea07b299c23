//! Template dependency extraction, variable substitution, and context-budget
//! fitting.
//!
//! Prompt templates reference other stages with `{...}` placeholders. The
//! scan in [`scan_placeholders`] is a pure function over the template text;
//! resolution against the live graph happens in [`input_elements`] and in the
//! generation stage. Budget fitting ([`fit_messages`], [`assemble_chat`])
//! trims a candidate message list to the backend's reported context budget
//! while preserving structural validity: the system message survives, the
//! list never ends on an assistant turn, and the chat segment is never empty.

use regex::{NoExpand, Regex};
use std::sync::OnceLock;

use crate::engine::ExecutionEngine;
use crate::message::Message;

/// Key of the implicit element zero: the raw turn input. Never resolved
/// against the graph.
pub const USER_INPUT_KEY: &str = "user";

/// Placeholder resolved from the immediate upstream output instead of the
/// dependency graph.
pub const GENERIC_INPUT_KEY: &str = "input";

/// Fraction of the backend's reported maximum context length made available
/// to budget fitting.
pub const BUDGET_SCALE: f32 = 0.97;

/// Synthesized user turn used when fitting would otherwise leave the chat
/// history empty.
pub const DEFAULT_USER_TURN: &str = "Output: ";

/// What a placeholder token points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceholderRef {
    /// A literal upstream node id.
    Node { id: String },
    /// `beginNodeId@paramKey`: a parameter captured at the graph's entry node.
    BeginParam { node_id: String, key: String },
}

/// One placeholder token extracted from a template, in scan order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placeholder {
    /// The raw token text between the braces.
    pub raw: String,
    pub target: PlaceholderRef,
}

/// `{key, name}` pair describing one template dependency. Element zero is
/// always the literal `user` keyword.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptInputElement {
    pub key: String,
    pub name: String,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z][A-Za-z0-9_-]*(?:[:@][A-Za-z0-9_-]+)?)\}")
            .expect("placeholder regex is valid")
    })
}

/// Scans a template left to right for `{...}` placeholder tokens.
///
/// The first occurrence of each distinct token is kept, in insertion order;
/// later duplicates are ignored. This order defines both resolution order and
/// the dependency list. The reserved `user` and `input` keywords are not
/// placeholders: `user` is always element zero of the input-element list and
/// `input` resolves from the immediate upstream output.
#[must_use]
pub fn scan_placeholders(template: &str) -> Vec<Placeholder> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for caps in placeholder_regex().captures_iter(template) {
        let raw = caps[1].to_string();
        if raw.eq_ignore_ascii_case(USER_INPUT_KEY) || raw.eq_ignore_ascii_case(GENERIC_INPUT_KEY)
        {
            continue;
        }
        if seen.iter().any(|s| s == &raw) {
            continue;
        }
        seen.push(raw.clone());
        let target = if raw.to_ascii_lowercase().starts_with("begin@") {
            let (node_id, key) = raw.split_once('@').expect("token contains '@'");
            PlaceholderRef::BeginParam {
                node_id: node_id.to_string(),
                key: key.to_string(),
            }
        } else {
            PlaceholderRef::Node { id: raw.clone() }
        };
        out.push(Placeholder { raw, target });
    }
    out
}

/// Resolves a template's placeholders into the input-element list.
///
/// Element zero is the literal `user` keyword. Tokens that do not name a known
/// node (or a known entry-node parameter) are dropped, matching the behavior
/// of free-text templates that merely contain braces.
#[must_use]
pub fn input_elements(template: &str, engine: &dyn ExecutionEngine) -> Vec<PromptInputElement> {
    let mut res = vec![PromptInputElement {
        key: USER_INPUT_KEY.to_string(),
        name: "Input your question here:".to_string(),
    }];
    for ph in scan_placeholders(template) {
        match &ph.target {
            PlaceholderRef::BeginParam { node_id, key } => {
                let Some(begin) = engine.get_component(node_id) else {
                    continue;
                };
                if let Some(param) = begin.query.iter().find(|p| &p.key == key) {
                    res.push(PromptInputElement {
                        key: ph.raw.clone(),
                        name: param.name.clone(),
                    });
                }
            }
            PlaceholderRef::Node { id } => {
                let Some(name) = engine.get_component_name(id) else {
                    continue;
                };
                res.push(PromptInputElement {
                    key: id.clone(),
                    name,
                });
            }
        }
    }
    res
}

/// The dependency set for scheduling purposes: element zero and conversational
/// anchors (ids containing `answer` or `begin`) are excluded.
#[must_use]
pub fn dependent_components(elements: &[PromptInputElement]) -> Vec<String> {
    elements
        .iter()
        .skip(1)
        .filter(|e| {
            let lower = e.key.to_ascii_lowercase();
            !lower.contains("answer") && !lower.contains("begin")
        })
        .map(|e| e.key.clone())
        .collect()
}

/// Substitutes every resolved `{key}` occurrence with its value.
///
/// The key is regex-escaped and the value is inserted literally, so neither
/// regex metacharacters in node ids nor backslashes in substituted content
/// are interpreted.
#[must_use]
pub fn substitute(template: &str, vars: &[(String, String)]) -> String {
    let mut prompt = template.to_string();
    for (key, value) in vars {
        let pattern = format!(r"\{{{}\}}", regex::escape(key));
        let re = Regex::new(&pattern).expect("escaped key forms a valid regex");
        prompt = re.replace_all(&prompt, NoExpand(value)).into_owned();
    }
    prompt
}

/// Replaces every `{input}` occurrence with the given text (empty string when
/// the upstream produced nothing).
#[must_use]
pub fn substitute_generic_input(template: &str, input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\{input\}").expect("literal pattern"));
    re.replace_all(template, NoExpand(input)).into_owned()
}

/// Greedy tail-first budget fitting.
///
/// Walks non-system messages from most recent backward, admitting each while
/// the accumulated length estimate stays within `budget`. The most recent
/// non-system message is always admitted, so a single very long turn is never
/// silently dropped. A leading system message is always retained and its cost
/// counts against the budget. An empty fitted chat segment is replaced by one
/// [`DEFAULT_USER_TURN`].
#[must_use]
pub fn fit_messages(
    messages: &[Message],
    budget: usize,
    count: &dyn Fn(&str) -> usize,
) -> Vec<Message> {
    let (system, rest) = match messages.first() {
        Some(m) if m.has_role(Message::SYSTEM) => (Some(m.clone()), &messages[1..]),
        _ => (None, messages),
    };

    let mut used = system.as_ref().map(|m| count(&m.content)).unwrap_or(0);
    let mut admitted: Vec<Message> = Vec::new();
    for msg in rest.iter().rev() {
        let cost = count(&msg.content);
        if !admitted.is_empty() && used + cost > budget {
            break;
        }
        used += cost;
        admitted.push(msg.clone());
    }
    admitted.reverse();

    if admitted.is_empty() {
        admitted.push(Message::user(DEFAULT_USER_TURN));
    }

    let mut out = Vec::with_capacity(admitted.len() + 1);
    if let Some(system) = system {
        out.push(system);
    }
    out.extend(admitted);
    out
}

/// Assembles the final (system prompt, chat history) pair for a backend call.
///
/// The candidate list is `[system: prompt] + history` with a trailing
/// assistant entry dropped, fitted to `max_length * BUDGET_SCALE`.
#[must_use]
pub fn assemble_chat(
    system_prompt: &str,
    mut history: Vec<Message>,
    max_length: usize,
    count: &dyn Fn(&str) -> usize,
) -> (String, Vec<Message>) {
    if history
        .last()
        .is_some_and(|m| m.has_role(Message::ASSISTANT))
    {
        history.pop();
    }

    let mut candidate = Vec::with_capacity(history.len() + 1);
    candidate.push(Message::system(system_prompt));
    candidate.extend(history);

    let budget = (max_length as f32 * BUDGET_SCALE) as usize;
    let fitted = fit_messages(&candidate, budget, count);

    let (system, chat) = match fitted.first() {
        Some(m) if m.has_role(Message::SYSTEM) => (m.content.clone(), fitted[1..].to_vec()),
        _ => (String::new(), fitted),
    };
    let chat = if chat.is_empty() {
        vec![Message::user(DEFAULT_USER_TURN)]
    } else {
        chat
    };
    (system, chat)
}
