//! Schema and value summaries used as grounding context for program generation.

use crate::table::cell::CellValue;
use crate::table::column_cells;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Categorical columns whose observed values are sampled into the prompt.
pub const KEY_COLUMNS: [&str; 6] = [
    "office_location",
    "category",
    "deployment_status",
    "status",
    "spine_current_status",
    "designation",
];

pub const MAX_SAMPLE_VALUES: usize = 20;
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Numeric,
    Text,
    Date,
}

impl ValueKind {
    pub fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::Date | DataType::Datetime(_, _) => ValueKind::Date,
            d if d.is_numeric() => ValueKind::Numeric,
            _ => ValueKind::Text,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Numeric => write!(f, "numeric"),
            ValueKind::Text => write!(f, "text"),
            ValueKind::Date => write!(f, "date"),
        }
    }
}

/// Column name -> inferred value kind, in table column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub columns: Vec<(String, ValueKind)>,
}

impl SchemaSummary {
    pub fn from_frame(df: &DataFrame) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|s| (s.name().to_string(), ValueKind::of(s.dtype())))
            .collect();
        Self { columns }
    }

    pub fn kind_of(&self, column: &str) -> Option<ValueKind> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, kind)| *kind)
    }

    pub fn render(&self) -> String {
        self.columns
            .iter()
            .map(|(name, kind)| format!("- {}: {}", name, kind))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Bounded sample of a categorical column's distinct values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSample {
    pub column: String,
    pub values: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSummary {
    pub samples: Vec<ValueSample>,
    pub report_dates: Vec<NaiveDate>,
    pub latest_report_date: Option<NaiveDate>,
}

impl ValueSummary {
    /// Sample the key columns present in `df`. `report_dates` must already be sorted ascending.
    pub fn from_frame(df: &DataFrame, report_dates: &[NaiveDate]) -> PolarsResult<Self> {
        let present: HashSet<&str> = df.get_column_names().into_iter().collect();
        let mut samples = Vec::new();

        for column in KEY_COLUMNS {
            if !present.contains(column) {
                continue;
            }
            samples.push(sample_distinct(column, &column_cells(df, column)?));
        }

        Ok(Self {
            samples,
            report_dates: report_dates.to_vec(),
            latest_report_date: report_dates.last().copied(),
        })
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .samples
            .iter()
            .map(|sample| {
                let mut shown = sample.values.clone();
                if sample.truncated {
                    shown.push(TRUNCATION_MARKER.to_string());
                }
                format!(
                    "{}: {}",
                    sample.column,
                    serde_json::to_string(&shown).unwrap_or_default()
                )
            })
            .collect();

        let dates: Vec<String> = self
            .report_dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();
        lines.push(format!(
            "report_date (available snapshots): {}",
            serde_json::to_string(&dates).unwrap_or_default()
        ));
        if let Some(latest) = self.latest_report_date {
            lines.push(format!("latest report_date: {}", latest.format("%Y-%m-%d")));
        }

        lines.join("\n")
    }
}

fn sample_distinct(column: &str, cells: &[CellValue]) -> ValueSample {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    let mut truncated = false;

    for cell in cells.iter().filter(|c| !c.is_null()) {
        let rendered = cell.to_string();
        if seen.contains(&rendered) {
            continue;
        }
        if values.len() == MAX_SAMPLE_VALUES {
            truncated = true;
            break;
        }
        seen.insert(rendered.clone());
        values.push(rendered);
    }

    ValueSample {
        column: column.to_string(),
        values,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_bounded_with_marker() {
        let cells: Vec<CellValue> = (0..30)
            .map(|i| CellValue::Text(format!("Office {}", i)))
            .collect();
        let sample = sample_distinct("office_location", &cells);
        assert_eq!(sample.values.len(), MAX_SAMPLE_VALUES);
        assert!(sample.truncated);
    }

    #[test]
    fn test_sample_keeps_first_seen_order_and_skips_nulls() {
        let cells = vec![
            CellValue::Text("Delhi".into()),
            CellValue::Null,
            CellValue::Text("Mumbai".into()),
            CellValue::Text("Delhi".into()),
        ];
        let sample = sample_distinct("office_location", &cells);
        assert_eq!(sample.values, vec!["Delhi", "Mumbai"]);
        assert!(!sample.truncated);
    }

    #[test]
    fn test_exactly_twenty_values_is_not_truncated() {
        let cells: Vec<CellValue> = (0..20)
            .map(|i| CellValue::Text(format!("D{}", i)))
            .collect();
        assert!(!sample_distinct("designation", &cells).truncated);
    }
}
