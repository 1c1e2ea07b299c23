//! SQL extraction from generated answers.
//!
//! Database access is disabled in this environment, so the stage only parses
//! a statement out of its input (fenced ```sql block first, then a bare
//! SELECT heuristic) and reports it without ever executing anything.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::component::generate::strip_reasoning;
use crate::component::params::{check_empty, check_positive_number, check_valid_value};
use crate::component::{
    Component, ComponentOutcome, GenerateParam, OutputSlot, RunOptions, StageContext,
};
use crate::errors::{ComponentError, ConfigurationError};
use crate::message::Message;
use crate::output::OutputTable;

const DB_TYPES: &[&str] = &["mysql", "postgresql", "mariadb", "mssql"];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExeSqlParam {
    #[serde(flatten)]
    pub gen: GenerateParam,
    pub db_type: String,
    pub database: String,
    pub username: String,
    pub host: String,
    pub port: i64,
    pub password: String,
    /// Retry budget for statement repair, kept for configuration
    /// compatibility; repair is disabled along with execution.
    #[serde(rename = "loop")]
    pub loop_count: i64,
    pub top_n: i64,
}

impl Default for ExeSqlParam {
    fn default() -> Self {
        Self {
            gen: GenerateParam::default(),
            db_type: "mysql".to_string(),
            database: String::new(),
            username: String::new(),
            host: String::new(),
            port: 3306,
            password: String::new(),
            loop_count: 3,
            top_n: 30,
        }
    }
}

impl ExeSqlParam {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        self.gen.check()?;
        check_valid_value(&self.db_type, "Choose DB type", DB_TYPES)?;
        check_empty(&self.database, "Database name")?;
        check_empty(&self.username, "database username")?;
        check_empty(&self.host, "IP Address")?;
        check_positive_number(self.port, "IP Port")?;
        check_empty(&self.password, "Database password")?;
        check_positive_number(self.top_n, "Number of records")?;
        if self.database == "rag_flow"
            && (self.host == "ragflow-mysql" || self.password == "infini_rag_flow")
        {
            return Err(ConfigurationError::new(
                "for security reasons, the database name rag_flow is not supported",
            ));
        }
        Ok(())
    }
}

/// Pulls a SQL statement out of free text: a fenced ```sql block wins; failing
/// that, the text is sliced from its first `SELECT` and trimmed after the last
/// complete `;`-terminated statement.
pub(crate) fn extract_sql(text: &str) -> Option<String> {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    static LEADING: OnceLock<Regex> = OnceLock::new();
    static INTERIOR: OnceLock<Regex> = OnceLock::new();
    static TRAILING: OnceLock<Regex> = OnceLock::new();

    let text = strip_reasoning(text);

    let fenced = FENCED.get_or_init(|| {
        Regex::new(r"(?s)```sql\s*(.*?)\s*```").expect("literal pattern")
    });
    if let Some(caps) = fenced.captures(&text) {
        return Some(caps[1].to_string());
    }

    if !text.to_lowercase().contains("select") {
        return None;
    }
    let leading = LEADING.get_or_init(|| {
        Regex::new(r"(?is)^.*?SELECT ").expect("literal pattern")
    });
    let interior = INTERIOR.get_or_init(|| {
        Regex::new(r"(?is);.*?SELECT ").expect("literal pattern")
    });
    let trailing = TRAILING.get_or_init(|| Regex::new(r";[^;]*$").expect("literal pattern"));

    let sql = leading.replace(&text, "SELECT ");
    let sql = interior.replace_all(&sql, "; SELECT ");
    let sql = trailing.replace(&sql, ";").into_owned();
    if sql.trim().is_empty() {
        return None;
    }
    Some(sql)
}

pub struct ExeSql {
    id: String,
    param: ExeSqlParam,
    ctx: StageContext,
    slot: OutputSlot,
}

impl ExeSql {
    pub fn new(id: &str, param: ExeSqlParam, ctx: StageContext) -> Self {
        Self {
            id: id.to_string(),
            param,
            ctx,
            slot: OutputSlot::new(),
        }
    }

    fn parse_and_report(&self, input: &str) -> OutputTable {
        match extract_sql(input) {
            Some(sql) => {
                info!(id = %self.id, sql = %sql, "parsed SQL statement (not executed)");
                OutputTable::be_output(format!(
                    "SQL execution is disabled; parsed statement for '{}' (not executed): {sql}",
                    self.param.db_type
                ))
            }
            None => {
                warn!(id = %self.id, "no SQL statement found in input");
                OutputTable::be_output(
                    "SQL statement not found in the input; execution is disabled anyway",
                )
            }
        }
    }
}

#[async_trait]
impl Component for ExeSql {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_name(&self) -> &str {
        "ExeSQL"
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        self.param.check()
    }

    async fn run(
        &self,
        _history: &[Message],
        _opts: RunOptions,
    ) -> Result<ComponentOutcome, ComponentError> {
        let input = self.get_input().joined("");
        let table = self.parse_and_report(&input);
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
        let input = inputs
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("");
        Ok(self.parse_and_report(&input))
    }
}
