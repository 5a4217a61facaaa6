//! Unified Table
//!
//! All snapshot rows concatenated into one polars frame, stamped with `report_date`,
//! together with the schema/value summaries derived from it.

pub mod cell;
pub mod summary;

pub use cell::CellValue;
pub use summary::{SchemaSummary, ValueKind, ValueSummary};

use crate::error::Result;
use crate::ingestion::normalize::{coerce_date, is_date_column};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Name of the provenance column stamped on every row.
pub const REPORT_DATE_COLUMN: &str = "report_date";

/// Preferred de-duplication key for counting people.
pub const PERSON_KEY_COLUMN: &str = "employee_id";

/// Rows of one loaded snapshot with already-normalized column names.
#[derive(Debug, Clone)]
pub struct SnapshotRows {
    pub source_file: String,
    pub report_date: NaiveDate,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone)]
pub struct UnifiedTable {
    frame: DataFrame,
    schema: SchemaSummary,
    values: ValueSummary,
    report_dates: Vec<NaiveDate>,
    source_files: Vec<String>,
}

impl UnifiedTable {
    /// Concatenate snapshots into one table. The column set is the union of all
    /// snapshot columns; a column missing from a snapshot is null for its rows.
    pub fn from_snapshots(snapshots: &[SnapshotRows]) -> Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for snapshot in snapshots {
            for name in &snapshot.columns {
                if name != REPORT_DATE_COLUMN && seen.insert(name.as_str()) {
                    columns.push(name.clone());
                }
            }
        }

        let positions: Vec<HashMap<&str, usize>> = snapshots
            .iter()
            .map(|s| {
                s.columns
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| (name.as_str(), idx))
                    .collect()
            })
            .collect();

        let mut series = Vec::with_capacity(columns.len() + 1);
        for name in &columns {
            let mut cells = Vec::new();
            for (snapshot, position) in snapshots.iter().zip(&positions) {
                let idx = position.get(name.as_str()).copied();
                for row in &snapshot.rows {
                    let cell = idx
                        .and_then(|i| row.get(i))
                        .cloned()
                        .unwrap_or(CellValue::Null);
                    cells.push(cell);
                }
            }
            series.push(build_series(name, cells)?);
        }

        let stamp: Vec<Option<i32>> = snapshots
            .iter()
            .flat_map(|s| {
                std::iter::repeat(Some(cell::date_to_days(s.report_date))).take(s.rows.len())
            })
            .collect();
        series.push(Series::new(REPORT_DATE_COLUMN, stamp).cast(&DataType::Date)?);

        let frame = DataFrame::new(series)?;

        let mut report_dates: Vec<NaiveDate> = snapshots.iter().map(|s| s.report_date).collect();
        report_dates.sort();
        report_dates.dedup();

        let schema = SchemaSummary::from_frame(&frame);
        let values = ValueSummary::from_frame(&frame, &report_dates)?;
        debug!(
            "Unified table built: {} rows x {} columns",
            frame.height(),
            frame.width()
        );

        Ok(Self {
            frame,
            schema,
            values,
            report_dates,
            source_files: snapshots.iter().map(|s| s.source_file.clone()).collect(),
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn schema(&self) -> &SchemaSummary {
        &self.schema
    }

    pub fn values(&self) -> &ValueSummary {
        &self.values
    }

    /// Report dates present in the table, ascending.
    pub fn report_dates(&self) -> &[NaiveDate] {
        &self.report_dates
    }

    pub fn latest_report_date(&self) -> Option<NaiveDate> {
        self.report_dates.last().copied()
    }

    pub fn source_files(&self) -> &[String] {
        &self.source_files
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_names().contains(&name)
    }
}

/// Read every value of `column` out of `df` as owned cells.
pub fn column_cells(df: &DataFrame, column: &str) -> PolarsResult<Vec<CellValue>> {
    let series = df.column(column)?;
    (0..series.len())
        .map(|idx| series.get(idx).map(CellValue::from_any_value))
        .collect()
}

/// Pick a column type from its cells: numeric when every non-null cell is a number,
/// date when every non-null cell is a date, text otherwise.
fn build_series(name: &str, cells: Vec<CellValue>) -> PolarsResult<Series> {
    if is_date_column(name) {
        let days: Vec<Option<i32>> = cells
            .iter()
            .map(|c| coerce_date(c).map(cell::date_to_days))
            .collect();
        return Series::new(name, days).cast(&DataType::Date);
    }

    let non_null = || cells.iter().filter(|c| !c.is_null());
    let all_numeric = non_null().all(|c| matches!(c, CellValue::Number(_)));
    let all_dates = non_null().all(|c| matches!(c, CellValue::Date(_)));
    let any_value = non_null().next().is_some();

    if any_value && all_numeric {
        let numbers: Vec<Option<f64>> = cells.iter().map(|c| c.as_number()).collect();
        Ok(Series::new(name, numbers))
    } else if any_value && all_dates {
        let days: Vec<Option<i32>> = cells
            .iter()
            .map(|c| match c {
                CellValue::Date(d) => Some(cell::date_to_days(*d)),
                _ => None,
            })
            .collect();
        Series::new(name, days).cast(&DataType::Date)
    } else {
        let text: Vec<Option<String>> = cells
            .iter()
            .map(|c| if c.is_null() { None } else { Some(c.to_string()) })
            .collect();
        Ok(Series::new(name, text))
    }
}
