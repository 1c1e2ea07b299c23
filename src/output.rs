//! The result-row model shared by every stage.
//!
//! Stage results are explicit structs rather than loose mappings: every field
//! a downstream consumer may look for is declared here and optional when it is
//! genuinely optional.

use serde::{Deserialize, Serialize};

use crate::reference::Reference;

/// One row of a stage's structured result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    /// The row's text payload. Always present; may be empty.
    #[serde(default)]
    pub content: String,
    /// Citation payload, attached by the generation stage when citing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    /// Serialized chunk payload produced by retrieval stages, consumed by
    /// citation assembly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<String>,
    /// Operator-configured message to surface when retrieval found nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_response: Option<String>,
}

impl OutputRow {
    /// A plain content row with an empty reference list.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reference: Some(Reference::empty()),
            ..Default::default()
        }
    }
}

/// An ordered list of [`OutputRow`]s: the cached output of one stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    rows: Vec<OutputRow>,
}

impl OutputTable {
    /// Canonical one-row result `{content, reference: []}`.
    pub fn be_output(content: impl Into<String>) -> Self {
        Self {
            rows: vec![OutputRow::text(content)],
        }
    }

    pub fn from_rows(rows: Vec<OutputRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    #[must_use]
    pub fn first(&self) -> Option<&OutputRow> {
        self.rows.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when there is no row whose content survives trimming.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(|r| r.content.trim().is_empty())
    }

    /// Joins row contents into the bulleted multi-line form used for prompt
    /// substitution: `"  - " + content` per row, newline-joined. Empty string
    /// when there are no rows.
    #[must_use]
    pub fn bulleted(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        let items: Vec<&str> = self.rows.iter().map(|r| r.content.as_str()).collect();
        format!("  - {}", items.join("\n  - "))
    }

    /// Joins row contents with the given separator.
    #[must_use]
    pub fn joined(&self, sep: &str) -> String {
        self.rows
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join(sep)
    }
}
