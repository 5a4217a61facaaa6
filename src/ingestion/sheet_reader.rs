//! Sheet Reader - parses one worksheet of a snapshot file into raw headers and cells.
//!
//! Workbook formats go through calamine; a `.csv` file is treated as a single
//! worksheet and read with the csv crate.

use crate::error::{AgentError, Result};
use crate::table::CellValue;
use calamine::{open_workbook_auto, Data, DataType, Reader};
use csv::ReaderBuilder;
use std::path::Path;

/// Header row plus data rows of one worksheet, before header normalization.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sheet names available in `path`. A CSV file reports its file stem as its only sheet.
pub fn list_sheets(path: &Path) -> Result<Vec<String>> {
    if is_csv(path) {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![stem]);
    }
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names())
}

/// Read the named worksheet. For CSV input the sheet name is not checked.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<RawSheet> {
    if is_csv(path) {
        return read_csv(path);
    }

    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    if !names.iter().any(|n| n == sheet) {
        return Err(AgentError::MissingSheet {
            file: file_label(path),
            sheet: sheet.to_string(),
            available: names.join(", "),
        });
    }

    let range = workbook.worksheet_range(sheet)?;
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(header_text).collect())
        .unwrap_or_default();

    let rows = rows
        .map(|row| row.iter().map(convert_cell).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|c| !c.is_null()))
        .collect();

    Ok(RawSheet {
        sheet_name: sheet.to_string(),
        headers,
        rows,
    })
}

fn read_csv(path: &Path) -> Result<RawSheet> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row: Vec<CellValue> = (0..headers.len())
            .map(|idx| CellValue::from_csv_field(record.get(idx).unwrap_or("")))
            .collect();
        if row.iter().any(|c| !c.is_null()) {
            rows.push(row);
        }
    }

    Ok(RawSheet {
        sheet_name: file_label(path),
        headers,
        rows,
    })
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::String(s) => CellValue::from_text(s),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        other => other
            .as_date()
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::from_text(&other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use std::fs;

    #[test]
    fn test_read_csv_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report_16102025.csv");
        fs::write(
            &path,
            "Employee ID,Designation,Office Location\n1001,Consultant,Delhi\n,,\n1002,Senior Consultant,\n",
        )
        .unwrap();

        let sheet = read_sheet(&path, "Availability Tracker").unwrap();
        assert_eq!(sheet.headers, vec!["Employee ID", "Designation", "Office Location"]);
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.rows[0][0], CellValue::Number(1001.0));
        assert_eq!(sheet.rows[1][2], CellValue::Null);
    }

    #[test]
    fn test_corrupt_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report_16102025.xlsx");
        fs::write(&path, "this is not a zip archive").unwrap();
        assert!(read_sheet(&path, "Availability Tracker").is_err());
    }

    #[test]
    fn test_csv_lists_single_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "a\n1\n").unwrap();
        assert_eq!(list_sheets(&path).unwrap(), vec!["export"]);
    }

    #[test]
    fn test_read_workbook_cell_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report_16102025.xlsx");

        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let joined = ExcelDateTime::from_ymd(2023, 4, 3).unwrap();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Availability Tracker").unwrap();
        let headers = [" Employee ID ", "Designation", "Date of Joining", "Office Location"];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_number(0, 4, 2025.0).unwrap();
        sheet.write_number(1, 0, 1001.0).unwrap();
        sheet.write_string(1, 1, " Consultant ").unwrap();
        sheet.write_datetime_with_format(1, 2, &joined, &date_format).unwrap();
        sheet.write_string(1, 4, "yes").unwrap();
        workbook.add_worksheet().set_name("Notes").unwrap();
        workbook.save(&path).unwrap();

        assert_eq!(list_sheets(&path).unwrap(), vec!["Availability Tracker", "Notes"]);

        let raw = read_sheet(&path, "Availability Tracker").unwrap();
        assert_eq!(raw.sheet_name, "Availability Tracker");
        assert_eq!(
            raw.headers,
            vec!["Employee ID", "Designation", "Date of Joining", "Office Location", "2025"]
        );
        assert_eq!(raw.row_count(), 1);
        assert_eq!(
            raw.rows[0],
            vec![
                CellValue::Number(1001.0),
                CellValue::Text("Consultant".to_string()),
                CellValue::Date(NaiveDate::from_ymd_opt(2023, 4, 3).unwrap()),
                CellValue::Null,
                CellValue::Text("yes".to_string()),
            ]
        );
    }

    #[test]
    fn test_workbook_without_requested_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report_16102025.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Sheet1").unwrap();
        sheet.write_string(0, 0, "Employee ID").unwrap();
        workbook.save(&path).unwrap();

        match read_sheet(&path, "Availability Tracker").unwrap_err() {
            AgentError::MissingSheet { file, sheet, available } => {
                assert_eq!(file, "Report_16102025.xlsx");
                assert_eq!(sheet, "Availability Tracker");
                assert_eq!(available, "Sheet1");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
