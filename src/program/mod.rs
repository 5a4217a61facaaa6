//! Query Programs
//!
//! The restricted program language the generator writes. A program is a JSON document
//! with exactly two recognised bindings, `result` and `explanation`; `result` is a
//! declarative expression over row selections ("frames") of the unified table.
//! Programs are interpreted by [`executor::SandboxedExecutor`], never evaluated as code.

pub mod executor;
pub mod value;

pub use executor::{ExecutionOutcome, SandboxedExecutor, REFUSAL_RESULT};
pub use value::{Breakdown, ChartValue, ResultValue, TableValue};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker that prefixes a rendered execution failure.
pub const ERROR_MARKER: &str = "Error:";

/// Result text when a program binds no value, or an empty one.
pub const NO_RESULT_FOUND: &str = "No result found";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgramError {
    #[error("malformed program: {0}")]
    Malformed(String),

    #[error("column '{column}' does not exist (available: {available})")]
    UnknownColumn { column: String, available: String },

    #[error("no snapshot dated {date} (available: {available})")]
    UnknownSnapshot { date: String, available: String },

    #[error("cannot apply '{op}' to column '{column}': {detail}")]
    TypeMismatch {
        column: String,
        op: String,
        detail: String,
    },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("table operation failed: {0}")]
    Table(String),
}

impl From<polars::error::PolarsError> for ProgramError {
    fn from(e: polars::error::PolarsError) -> Self {
        ProgramError::Table(e.to_string())
    }
}

/// A generated program: the two output bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    #[serde(default)]
    pub result: Option<Expr>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Which report snapshots a frame covers. Frames without a scope see the latest report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SnapshotScope {
    All,
    #[default]
    Latest,
    On(NaiveDate),
}

impl TryFrom<String> for SnapshotScope {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SnapshotScope::All),
            "latest" | "current" | "" => Ok(SnapshotScope::Latest),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(SnapshotScope::On)
                .map_err(|_| {
                    format!(
                        "snapshot must be \"all\", \"latest\" or a YYYY-MM-DD date, got \"{}\"",
                        value
                    )
                }),
        }
    }
}

impl From<SnapshotScope> for String {
    fn from(scope: SnapshotScope) -> Self {
        match scope {
            SnapshotScope::All => "all".to_string(),
            SnapshotScope::Latest => "latest".to_string(),
            SnapshotScope::On(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A row selection: snapshot scope plus AND-ed conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Frame {
    pub snapshot: SnapshotScope,
    pub filters: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    NotNull,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
            FilterOp::Contains => "contains",
            FilterOp::NotContains => "not_contains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::IsNull => "is_null",
            FilterOp::NotNull => "not_null",
        }
    }

    /// Free-text operators whose matches are reported when they hit several stored values.
    pub fn is_free_text(&self) -> bool {
        matches!(self, FilterOp::Contains | FilterOp::StartsWith)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comparison {
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// OR group
    Any { any: Vec<Condition> },
    Compare(Comparison),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Sum,
    Mean,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    #[default]
    Rows,
    People,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Bar,
    Pie,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    #[serde(default)]
    pub frame: Frame,
    pub column: String,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowsSpec {
    #[serde(default)]
    pub frame: Frame,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateSpec {
    #[serde(default)]
    pub frame: Frame,
    pub column: String,
    pub func: AggregateFn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakdownSpec {
    #[serde(default)]
    pub frame: Frame,
    pub by: String,
    #[serde(default)]
    pub measure: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChartSpec {
    #[serde(default)]
    pub kind: ChartKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub frame: Frame,
    pub by: String,
    #[serde(default)]
    pub measure: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedExpr {
    pub label: String,
    pub value: Expr,
}

/// Result expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    CountRows(Frame),
    /// Unique `employee_id` values when the column exists, otherwise rows.
    CountPeople(Frame),
    CountUnique(ColumnSpec),
    Values(ColumnSpec),
    Rows(RowsSpec),
    Aggregate(AggregateSpec),
    Breakdown(BreakdownSpec),
    Chart(ChartSpec),
    Named(Vec<NamedExpr>),
    Literal(serde_json::Value),
    /// Relevance refusal carrying the reason shown to the user.
    Refuse(String),
}

/// Remove markdown code-fence decoration around generated text.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed.trim_start_matches('`'),
    };
    body.trim_end()
        .trim_end_matches("```")
        .trim()
        .to_string()
}

/// Parse generated text (fences allowed) into a program.
pub fn parse_program(text: &str) -> Result<Program, ProgramError> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(ProgramError::Malformed("empty program".to_string()));
    }
    serde_json::from_str(&cleaned).map_err(|e| ProgramError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_parse_program_shapes() {
        let program = parse_program(
            r#"```json
{"result": {"count_people": {"snapshot": "latest", "filters": [
   {"column": "designation", "op": "eq", "value": "Consultant"},
   {"any": [
     {"column": "office_location", "op": "contains", "value": "delhi"},
     {"column": "office_location", "op": "eq", "value": "Noida"}
   ]}
 ]}},
 "explanation": "Filter Designation for Consultant."}
```"#,
        )
        .unwrap();

        match program.result {
            Some(Expr::CountPeople(frame)) => {
                assert_eq!(frame.snapshot, SnapshotScope::Latest);
                assert_eq!(frame.filters.len(), 2);
                assert!(matches!(frame.filters[1], Condition::Any { .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            program.explanation.as_deref(),
            Some("Filter Designation for Consultant.")
        );
    }

    #[test]
    fn test_unknown_binding_is_malformed() {
        let err = parse_program(r#"{"results": {"count_rows": {}}}"#).unwrap_err();
        assert!(matches!(err, ProgramError::Malformed(_)));
    }

    #[test]
    fn test_snapshot_scope_parsing() {
        let frame: Frame = serde_json::from_str(r#"{"snapshot": "2025-10-09"}"#).unwrap();
        assert_eq!(
            frame.snapshot,
            SnapshotScope::On(NaiveDate::from_ymd_opt(2025, 10, 9).unwrap())
        );
        assert!(serde_json::from_str::<Frame>(r#"{"snapshot": "yesterday"}"#).is_err());
    }

    #[test]
    fn test_omitted_snapshot_is_latest() {
        let frame: Frame = serde_json::from_str(r#"{"filters": []}"#).unwrap();
        assert_eq!(frame.snapshot, SnapshotScope::Latest);
        let frame: Frame = serde_json::from_str(r#"{"snapshot": "all"}"#).unwrap();
        assert_eq!(frame.snapshot, SnapshotScope::All);
    }

    #[test]
    fn test_missing_bindings_are_allowed() {
        assert_eq!(parse_program("{}").unwrap(), Program::default());
    }
}
