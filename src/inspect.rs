//! Workbook inspection: a quick look at a snapshot file's sheets and columns before loading it.

use crate::error::{AgentError, Result};
use crate::ingestion::sheet_reader::{list_sheets, read_sheet};
use crate::table::{CellValue, ValueKind};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

const HEAD_ROWS: usize = 3;
const MAX_CATEGORY_VALUES: usize = 10;
/// Text columns with fewer distinct values than this are shown as categories.
const CATEGORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub name: String,
    pub kind: ValueKind,
    pub distinct: usize,
    /// Sample values, only for categorical text columns.
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkbookReport {
    pub file: String,
    pub sheets: Vec<String>,
    pub inspected_sheet: String,
    /// The requested sheet was missing and the first sheet was used instead.
    pub fell_back: bool,
    pub rows: usize,
    pub columns: Vec<ColumnReport>,
    pub head: Vec<Vec<String>>,
}

pub fn inspect_workbook(path: &Path, preferred_sheet: &str) -> Result<WorkbookReport> {
    let sheets = list_sheets(path)?;
    let (sheet, fell_back) = if sheets.iter().any(|s| s == preferred_sheet) {
        (preferred_sheet.to_string(), false)
    } else {
        let first = sheets.first().cloned().ok_or_else(|| {
            AgentError::Spreadsheet(format!("{} has no worksheets", path.display()))
        })?;
        (first, true)
    };

    let raw = read_sheet(path, &sheet)?;
    let columns = raw
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&CellValue> = raw.rows.iter().filter_map(|row| row.get(idx)).collect();
            column_report(name, &cells)
        })
        .collect();

    let head = raw
        .rows
        .iter()
        .take(HEAD_ROWS)
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect();

    Ok(WorkbookReport {
        file: path.display().to_string(),
        sheets,
        inspected_sheet: sheet,
        fell_back,
        rows: raw.rows.len(),
        columns,
        head,
    })
}

fn column_report(name: &str, cells: &[&CellValue]) -> ColumnReport {
    let present: Vec<&CellValue> = cells.iter().copied().filter(|c| !c.is_null()).collect();
    let kind = if !present.is_empty() && present.iter().all(|c| matches!(c, CellValue::Number(_))) {
        ValueKind::Numeric
    } else if !present.is_empty() && present.iter().all(|c| matches!(c, CellValue::Date(_))) {
        ValueKind::Date
    } else {
        ValueKind::Text
    };

    let distinct: BTreeSet<String> = present.iter().map(|c| c.to_string()).collect();
    let categories = (kind == ValueKind::Text && distinct.len() < CATEGORY_LIMIT)
        .then(|| distinct.iter().take(MAX_CATEGORY_VALUES).cloned().collect());

    ColumnReport {
        name: name.to_string(),
        kind,
        distinct: distinct.len(),
        categories,
    }
}

impl fmt::Display for WorkbookReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.file)?;
        writeln!(f, "Sheets: {}", self.sheets.join(", "))?;
        if self.fell_back {
            writeln!(f, "Requested sheet not found, using '{}'", self.inspected_sheet)?;
        }
        writeln!(
            f,
            "Shape: {} rows x {} columns",
            self.rows,
            self.columns.len()
        )?;
        writeln!(f, "Columns:")?;
        for column in &self.columns {
            writeln!(f, "  {} ({}, {} distinct)", column.name, column.kind, column.distinct)?;
        }
        writeln!(f, "First rows:")?;
        for row in &self.head {
            writeln!(f, "  {}", row.join(" | "))?;
        }
        let categorical: Vec<&ColumnReport> =
            self.columns.iter().filter(|c| c.categories.is_some()).collect();
        if !categorical.is_empty() {
            writeln!(f, "Categorical columns:")?;
            for column in categorical {
                if let Some(values) = &column.categories {
                    writeln!(f, "  {}: {}", column.name, values.join(", "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_inspect_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report_16102025.csv");
        fs::write(
            &path,
            "Employee ID,Designation,Office Location\n1,Consultant,Delhi\n2,Senior Consultant,Mumbai\n3,Consultant,Delhi\n4,Intern,Pune\n",
        )
        .unwrap();

        let report = inspect_workbook(&path, "Availability Tracker").unwrap();
        assert!(report.fell_back);
        assert_eq!(report.rows, 4);
        assert_eq!(report.head.len(), 3);
        assert_eq!(report.columns[0].kind, ValueKind::Numeric);
        assert_eq!(report.columns[0].categories, None);
        assert_eq!(
            report.columns[1].categories.as_deref(),
            Some(&["Consultant".to_string(), "Intern".to_string(), "Senior Consultant".to_string()][..])
        );
        assert!(report.to_string().contains("Shape: 4 rows x 3 columns"));
    }
}
