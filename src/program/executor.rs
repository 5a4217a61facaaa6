//! Sandboxed Executor
//!
//! Interprets a parsed [`Program`] against a borrowed [`UnifiedTable`]. The only thing a
//! program can reach is the table itself: there is no filesystem, network or ambient state,
//! and every row selection produces a new frame, so the table is never mutated.

use super::value::{Breakdown, ChartValue, ResultValue, TableValue};
use super::{
    parse_program, AggregateFn, AggregateSpec, ChartSpec, ColumnSpec, Comparison,
    Condition, Expr, FilterOp, Frame, Measure, Program, ProgramError, RowsSpec, SnapshotScope,
    ERROR_MARKER,
};
use crate::ingestion::normalize::parse_date_text;
use crate::table::summary::ValueKind;
use crate::table::{column_cells, CellValue, UnifiedTable, PERSON_KEY_COLUMN, REPORT_DATE_COLUMN};
use chrono::NaiveDate;
use itertools::Itertools;
use polars::prelude::*;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Result text of a relevance refusal.
pub const REFUSAL_RESULT: &str =
    "I can only answer questions about the employee availability data in the loaded reports.";

/// Label used for null values in breakdowns.
const BLANK_LABEL: &str = "(blank)";

const DEFAULT_ROW_LIMIT: usize = 50;

/// Typed outcome of running one program.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success {
        value: Option<ResultValue>,
        explanation: Option<String>,
    },
    Failure {
        error: ProgramError,
    },
}

impl ExecutionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::Failure { .. })
    }

    /// The failure rendered with the `Error:` marker, as shown to users.
    pub fn rendered_error(&self) -> Option<String> {
        match self {
            ExecutionOutcome::Failure { error } => Some(format!("{} {}", ERROR_MARKER, error)),
            ExecutionOutcome::Success { .. } => None,
        }
    }
}

/// Per-execution scratch state.
struct EvalContext<'a> {
    table: &'a UnifiedTable,
    notes: Vec<String>,
    refusal: Option<String>,
}

impl EvalContext<'_> {
    fn note(&mut self, note: String) {
        if !self.notes.contains(&note) {
            self.notes.push(note);
        }
    }

    fn require_column(&self, column: &str) -> Result<(), ProgramError> {
        if self.table.has_column(column) {
            Ok(())
        } else {
            Err(ProgramError::UnknownColumn {
                column: column.to_string(),
                available: self.table.column_names().join(", "),
            })
        }
    }

    fn kind_of(&self, column: &str) -> ValueKind {
        self.table
            .schema()
            .kind_of(column)
            .unwrap_or(ValueKind::Text)
    }
}

pub struct SandboxedExecutor {
    person_key: String,
    row_limit: usize,
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxedExecutor {
    pub fn new() -> Self {
        Self {
            person_key: PERSON_KEY_COLUMN.to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Parse and run generated program text. Every failure becomes `ExecutionOutcome::Failure`.
    pub fn execute(&self, table: &UnifiedTable, program_text: &str) -> ExecutionOutcome {
        let outcome = parse_program(program_text).and_then(|program| self.run(table, &program));
        match outcome {
            Ok((value, explanation)) => ExecutionOutcome::Success { value, explanation },
            Err(error) => {
                warn!("Program failed: {}", error);
                ExecutionOutcome::Failure { error }
            }
        }
    }

    /// Evaluate both output bindings of a parsed program.
    pub fn run(
        &self,
        table: &UnifiedTable,
        program: &Program,
    ) -> Result<(Option<ResultValue>, Option<String>), ProgramError> {
        let mut ctx = EvalContext {
            table,
            notes: Vec::new(),
            refusal: None,
        };

        let value = match &program.result {
            Some(expr) => self.eval(&mut ctx, expr)?,
            None => None,
        };
        let value = value.filter(|v| !v.is_empty());

        let mut parts: Vec<String> = Vec::new();
        match ctx.refusal.take() {
            Some(reason) => parts.push(reason),
            None => {
                if let Some(text) = program.explanation.as_deref() {
                    if !text.trim().is_empty() {
                        parts.push(text.trim().to_string());
                    }
                }
            }
        }
        parts.extend(ctx.notes.drain(..));

        let explanation = if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        };
        Ok((value, explanation))
    }

    fn eval(&self, ctx: &mut EvalContext<'_>, expr: &Expr) -> Result<Option<ResultValue>, ProgramError> {
        match expr {
            Expr::CountRows(frame) => {
                let df = self.resolve_frame(ctx, frame)?;
                Ok(Some(ResultValue::Number(df.height() as f64)))
            }
            Expr::CountPeople(frame) => {
                let df = self.resolve_frame(ctx, frame)?;
                Ok(Some(ResultValue::Number(self.count_people(ctx, &df)? as f64)))
            }
            Expr::CountUnique(spec) => self.count_unique(ctx, spec).map(Some),
            Expr::Values(spec) => self.values(ctx, spec).map(Some),
            Expr::Rows(spec) => self.rows(ctx, spec).map(Some),
            Expr::Aggregate(spec) => self.aggregate(ctx, spec),
            Expr::Breakdown(spec) => Ok(Some(ResultValue::Breakdown(self.breakdown(
                ctx,
                &spec.frame,
                &spec.by,
                spec.measure,
            )?))),
            Expr::Chart(spec) => self.chart(ctx, spec).map(Some),
            Expr::Named(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let value = self
                        .eval(ctx, &item.value)?
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| ResultValue::Text(super::NO_RESULT_FOUND.to_string()));
                    out.push((item.label.clone(), value));
                }
                Ok(Some(ResultValue::Named(out)))
            }
            Expr::Literal(value) => Ok(ResultValue::from_json(value)),
            Expr::Refuse(reason) => {
                debug!("Program refused the question: {}", reason);
                ctx.refusal = Some(reason.clone());
                Ok(Some(ResultValue::Text(REFUSAL_RESULT.to_string())))
            }
        }
    }

    fn resolve_frame(&self, ctx: &mut EvalContext<'_>, frame: &Frame) -> Result<DataFrame, ProgramError> {
        let mut df = ctx.table.frame().clone();

        let snapshot_date = match &frame.snapshot {
            SnapshotScope::All => None,
            SnapshotScope::Latest => ctx.table.latest_report_date(),
            SnapshotScope::On(date) => {
                if !ctx.table.report_dates().contains(date) {
                    return Err(ProgramError::UnknownSnapshot {
                        date: date.format("%Y-%m-%d").to_string(),
                        available: render_dates(ctx.table.report_dates()),
                    });
                }
                Some(*date)
            }
        };
        if let Some(date) = snapshot_date {
            let mask: Vec<bool> = column_cells(&df, REPORT_DATE_COLUMN)?
                .iter()
                .map(|cell| *cell == CellValue::Date(date))
                .collect();
            df = df.filter(&BooleanChunked::from_slice("snapshot", &mask))?;
        }

        for condition in &frame.filters {
            let mask = self.condition_mask(ctx, &df, condition)?;
            df = df.filter(&BooleanChunked::from_slice("filter", &mask))?;
        }
        for condition in &frame.filters {
            self.note_free_text_matches(ctx, &df, condition)?;
        }
        Ok(df)
    }

    fn condition_mask(
        &self,
        ctx: &mut EvalContext<'_>,
        df: &DataFrame,
        condition: &Condition,
    ) -> Result<Vec<bool>, ProgramError> {
        match condition {
            Condition::Any { any } => {
                if any.is_empty() {
                    return Err(ProgramError::InvalidValue(
                        "'any' needs at least one condition".to_string(),
                    ));
                }
                let mut mask = vec![false; df.height()];
                for inner in any {
                    let inner_mask = self.condition_mask(ctx, df, inner)?;
                    for (acc, hit) in mask.iter_mut().zip(inner_mask) {
                        *acc = *acc || hit;
                    }
                }
                Ok(mask)
            }
            Condition::Compare(cmp) => self.comparison_mask(ctx, df, cmp),
        }
    }

    fn comparison_mask(
        &self,
        ctx: &mut EvalContext<'_>,
        df: &DataFrame,
        cmp: &Comparison,
    ) -> Result<Vec<bool>, ProgramError> {
        ctx.require_column(&cmp.column)?;
        let predicate = Predicate::build(cmp, ctx.kind_of(&cmp.column))?;
        let cells = column_cells(df, &cmp.column)?;
        Ok(cells.iter().map(|cell| predicate.test(cell)).collect())
    }

    /// Notes the distinct stored values a `contains`/`starts_with` condition matched among the
    /// selected rows. Comparisons on one column inside an `any` group are reported together.
    fn note_free_text_matches(
        &self,
        ctx: &mut EvalContext<'_>,
        df: &DataFrame,
        condition: &Condition,
    ) -> Result<(), ProgramError> {
        let mut by_column: Vec<(&str, Vec<&Comparison>)> = Vec::new();
        collect_free_text(condition, &mut by_column);

        for (column, comparisons) in by_column {
            let kind = ctx.kind_of(column);
            let predicates = comparisons
                .iter()
                .map(|cmp| Predicate::build(cmp, kind))
                .collect::<Result<Vec<_>, _>>()?;
            let matched: Vec<String> = column_cells(df, column)?
                .iter()
                .filter(|cell| predicates.iter().any(|p| p.test(cell)))
                .map(|cell| cell.to_string())
                .unique()
                .collect();

            if matched.len() >= 2 {
                let described = comparisons
                    .iter()
                    .map(|cmp| format!("{} '{}'", cmp.op.as_str(), value_text(&cmp.value)))
                    .join(" or ");
                ctx.note(format!(
                    "Note: '{}' {} matched {} distinct values: {}.",
                    column,
                    described,
                    matched.len(),
                    matched.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Unique non-null `employee_id`s, or rows when the table has no such column.
    fn count_people(&self, ctx: &mut EvalContext<'_>, df: &DataFrame) -> Result<usize, ProgramError> {
        if !ctx.table.has_column(&self.person_key) {
            return Ok(df.height());
        }
        let ids = column_cells(df, &self.person_key)?;
        let mut unique = HashSet::new();
        let mut missing = 0usize;
        for id in &ids {
            if id.is_null() {
                missing += 1;
            } else {
                unique.insert(id.to_string());
            }
        }

        let repeated = ids.len() - missing - unique.len();
        if repeated > 0 {
            ctx.note(format!(
                "Note: {} row(s) repeat an {} already counted; each employee is counted once.",
                repeated, self.person_key
            ));
        }
        if missing > 0 {
            ctx.note(format!(
                "Note: {} row(s) have no {} and are not counted.",
                missing, self.person_key
            ));
        }
        Ok(unique.len())
    }

    fn count_unique(&self, ctx: &mut EvalContext<'_>, spec: &ColumnSpec) -> Result<ResultValue, ProgramError> {
        ctx.require_column(&spec.column)?;
        let df = self.resolve_frame(ctx, &spec.frame)?;
        let unique: HashSet<String> = column_cells(&df, &spec.column)?
            .iter()
            .filter(|c| !c.is_null())
            .map(|c| c.to_string())
            .collect();
        Ok(ResultValue::Number(unique.len() as f64))
    }

    fn values(&self, ctx: &mut EvalContext<'_>, spec: &ColumnSpec) -> Result<ResultValue, ProgramError> {
        ctx.require_column(&spec.column)?;
        let df = self.resolve_frame(ctx, &spec.frame)?;
        let cells = column_cells(&df, &spec.column)?;
        let rendered = cells.iter().filter(|c| !c.is_null()).map(|c| c.to_string());
        let out: Vec<String> = if spec.distinct {
            rendered.unique().collect()
        } else {
            rendered.collect()
        };
        Ok(ResultValue::List(out))
    }

    fn rows(&self, ctx: &mut EvalContext<'_>, spec: &RowsSpec) -> Result<ResultValue, ProgramError> {
        let columns = if spec.columns.is_empty() {
            ctx.table.column_names()
        } else {
            for column in &spec.columns {
                ctx.require_column(column)?;
            }
            spec.columns.clone()
        };
        let df = self.resolve_frame(ctx, &spec.frame)?;
        let limit = spec.limit.unwrap_or(self.row_limit).min(df.height());

        let mut cells_by_column = Vec::with_capacity(columns.len());
        for column in &columns {
            cells_by_column.push(column_cells(&df, column)?);
        }
        let rows = (0..limit)
            .map(|idx| cells_by_column.iter().map(|cells| cells[idx].to_string()).collect())
            .collect();

        Ok(ResultValue::Table(TableValue {
            columns,
            rows,
            total_rows: df.height(),
        }))
    }

    fn aggregate(
        &self,
        ctx: &mut EvalContext<'_>,
        spec: &AggregateSpec,
    ) -> Result<Option<ResultValue>, ProgramError> {
        ctx.require_column(&spec.column)?;
        if ctx.kind_of(&spec.column) != ValueKind::Numeric {
            return Err(ProgramError::TypeMismatch {
                column: spec.column.clone(),
                op: format!("{:?}", spec.func).to_lowercase(),
                detail: "aggregates need a numeric column".to_string(),
            });
        }
        let df = self.resolve_frame(ctx, &spec.frame)?;
        let numbers: Vec<f64> = column_cells(&df, &spec.column)?
            .iter()
            .filter_map(|c| c.as_number())
            .collect();

        let value = match spec.func {
            AggregateFn::Sum => Some(numbers.iter().sum()),
            AggregateFn::Mean if numbers.is_empty() => None,
            AggregateFn::Mean => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
            AggregateFn::Min => numbers.iter().copied().reduce(f64::min),
            AggregateFn::Max => numbers.iter().copied().reduce(f64::max),
        };
        Ok(value.map(ResultValue::Number))
    }

    fn breakdown(
        &self,
        ctx: &mut EvalContext<'_>,
        frame: &Frame,
        by: &str,
        measure: Measure,
    ) -> Result<Breakdown, ProgramError> {
        ctx.require_column(by)?;
        let df = self.resolve_frame(ctx, frame)?;
        let labels = column_cells(&df, by)?;
        let by_people = measure == Measure::People && ctx.table.has_column(&self.person_key);

        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, f64> = HashMap::new();
        let mut people: HashMap<String, HashSet<String>> = HashMap::new();

        let ids = if by_people {
            column_cells(&df, &self.person_key)?
        } else {
            Vec::new()
        };

        for (idx, label_cell) in labels.iter().enumerate() {
            let label = if label_cell.is_null() {
                BLANK_LABEL.to_string()
            } else {
                label_cell.to_string()
            };
            if !counts.contains_key(&label) && !people.contains_key(&label) {
                order.push(label.clone());
            }
            if by_people {
                let id = &ids[idx];
                let entry = people.entry(label).or_default();
                if !id.is_null() {
                    entry.insert(id.to_string());
                }
            } else {
                *counts.entry(label).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(String, f64)> = order
            .into_iter()
            .map(|label| {
                let count = if by_people {
                    people.get(&label).map(|s| s.len() as f64).unwrap_or(0.0)
                } else {
                    counts.get(&label).copied().unwrap_or(0.0)
                };
                (label, count)
            })
            .collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let total = entries.iter().map(|(_, c)| c).sum();

        Ok(Breakdown {
            column: by.to_string(),
            entries,
            total,
        })
    }

    fn chart(&self, ctx: &mut EvalContext<'_>, spec: &ChartSpec) -> Result<ResultValue, ProgramError> {
        let data = self.breakdown(ctx, &spec.frame, &spec.by, spec.measure)?;
        let title = spec.title.clone().unwrap_or_else(|| {
            let what = match spec.measure {
                Measure::People => "People",
                Measure::Rows => "Rows",
            };
            format!("{} by {}", what, spec.by)
        });
        Ok(ResultValue::Chart(ChartValue {
            kind: spec.kind,
            title,
            data,
        }))
    }
}

/// Comparable key for ordering operators.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum OrderKey {
    Number(f64),
    Date(NaiveDate),
}

/// A comparison with its operand validated against the column kind.
enum Predicate {
    Equals { value: Value, negate: bool },
    OneOf { values: Vec<Value>, negate: bool },
    Contains { needle: String, negate: bool },
    StartsWith { needle: String },
    Order { op: FilterOp, bound: OrderKey },
    IsNull { negate: bool },
}

impl Predicate {
    fn build(cmp: &Comparison, kind: ValueKind) -> Result<Self, ProgramError> {
        let mismatch = |detail: &str| ProgramError::TypeMismatch {
            column: cmp.column.clone(),
            op: cmp.op.as_str().to_string(),
            detail: detail.to_string(),
        };

        match cmp.op {
            FilterOp::Eq | FilterOp::Ne => {
                if cmp.value.is_array() || cmp.value.is_object() {
                    return Err(ProgramError::InvalidValue(format!(
                        "'{}' on '{}' needs a single value; use 'in' for lists",
                        cmp.op.as_str(),
                        cmp.column
                    )));
                }
                Ok(Predicate::Equals {
                    value: cmp.value.clone(),
                    negate: cmp.op == FilterOp::Ne,
                })
            }
            FilterOp::In | FilterOp::NotIn => match &cmp.value {
                Value::Array(values) => Ok(Predicate::OneOf {
                    values: values.clone(),
                    negate: cmp.op == FilterOp::NotIn,
                }),
                _ => Err(ProgramError::InvalidValue(format!(
                    "'{}' on '{}' needs a list of values",
                    cmp.op.as_str(),
                    cmp.column
                ))),
            },
            FilterOp::Contains | FilterOp::NotContains | FilterOp::StartsWith => {
                let needle = match &cmp.value {
                    Value::String(s) if !s.is_empty() => s.to_lowercase(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(mismatch("needs a non-empty text value")),
                };
                Ok(match cmp.op {
                    FilterOp::StartsWith => Predicate::StartsWith { needle },
                    op => Predicate::Contains {
                        needle,
                        negate: op == FilterOp::NotContains,
                    },
                })
            }
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let bound = match kind {
                    ValueKind::Numeric => cmp
                        .value
                        .as_f64()
                        .or_else(|| cmp.value.as_str().and_then(|s| s.trim().parse().ok()))
                        .map(OrderKey::Number)
                        .ok_or_else(|| mismatch("needs a numeric value"))?,
                    ValueKind::Date => cmp
                        .value
                        .as_str()
                        .and_then(parse_date_text)
                        .map(OrderKey::Date)
                        .ok_or_else(|| mismatch("needs a YYYY-MM-DD date value"))?,
                    ValueKind::Text => {
                        return Err(mismatch("ordering needs a numeric or date column"))
                    }
                };
                Ok(Predicate::Order { op: cmp.op, bound })
            }
            FilterOp::IsNull => Ok(Predicate::IsNull { negate: false }),
            FilterOp::NotNull => Ok(Predicate::IsNull { negate: true }),
        }
    }

    fn test(&self, cell: &CellValue) -> bool {
        match self {
            Predicate::Equals { value, negate } => cell_equals(cell, value) != *negate,
            Predicate::OneOf { values, negate } => {
                values.iter().any(|v| cell_equals(cell, v)) != *negate
            }
            Predicate::Contains { needle, negate } => {
                let hit = !cell.is_null() && cell.to_string().to_lowercase().contains(needle);
                hit != *negate
            }
            Predicate::StartsWith { needle } => {
                !cell.is_null() && cell.to_string().to_lowercase().starts_with(needle)
            }
            Predicate::Order { op, bound } => {
                let key = match (cell, bound) {
                    (CellValue::Number(n), OrderKey::Number(_)) => OrderKey::Number(*n),
                    (CellValue::Date(d), OrderKey::Date(_)) => OrderKey::Date(*d),
                    _ => return false,
                };
                match key.partial_cmp(bound) {
                    Some(ordering) => match op {
                        FilterOp::Gt => ordering == Ordering::Greater,
                        FilterOp::Gte => ordering != Ordering::Less,
                        FilterOp::Lt => ordering == Ordering::Less,
                        FilterOp::Lte => ordering != Ordering::Greater,
                        _ => false,
                    },
                    None => false,
                }
            }
            Predicate::IsNull { negate } => cell.is_null() != *negate,
        }
    }
}

/// Exact, case-sensitive equality between a stored cell and a JSON operand.
fn cell_equals(cell: &CellValue, value: &Value) -> bool {
    match (cell, value) {
        (CellValue::Null, Value::Null) => true,
        (CellValue::Null, _) | (_, Value::Null) => false,
        (CellValue::Text(s), Value::String(v)) => s == v,
        (CellValue::Text(s), Value::Number(n)) => {
            matches!((s.trim().parse::<f64>(), n.as_f64()), (Ok(a), Some(b)) if a == b)
        }
        (CellValue::Text(s), Value::Bool(b)) => s.eq_ignore_ascii_case(&b.to_string()),
        (CellValue::Number(x), Value::Number(n)) => n.as_f64() == Some(*x),
        (CellValue::Number(x), Value::String(v)) => v.trim().parse::<f64>().ok() == Some(*x),
        (CellValue::Date(d), Value::String(v)) => parse_date_text(v) == Some(*d),
        _ => false,
    }
}

/// Free-text comparisons of a condition, grouped by column in first-seen order.
fn collect_free_text<'c>(condition: &'c Condition, by_column: &mut Vec<(&'c str, Vec<&'c Comparison>)>) {
    match condition {
        Condition::Any { any } => {
            for inner in any {
                collect_free_text(inner, by_column);
            }
        }
        Condition::Compare(cmp) if cmp.op.is_free_text() => {
            match by_column.iter_mut().find(|(column, _)| *column == cmp.column) {
                Some((_, comparisons)) => comparisons.push(cmp),
                None => by_column.push((cmp.column.as_str(), vec![cmp])),
            }
        }
        Condition::Compare(_) => {}
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_dates(dates: &[NaiveDate]) -> String {
    dates.iter().map(|d| d.format("%Y-%m-%d")).join(", ")
}
