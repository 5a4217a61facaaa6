//! Header normalization, the fixed rename table, and date coercion.

use crate::table::cell::{excel_serial_to_date, CellValue};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};

lazy_static::lazy_static! {
    /// Known malformed headers and their canonical names.
    static ref RENAME_MAP: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Corrupted identifier header seen in exported trackers.
        m.insert("emplo_a514_a1_a1_n18", "employee_id");
        m.insert("rm_name", "reporting_manager");
        m.insert("lwd", "last_working_day");
        m
    };
}

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// Lowercase, drop dots, and collapse runs of whitespace/punctuation into single underscores.
///
/// `"Office Location"` -> `office_location`, `"sPInE Current status"` -> `spine_current_status`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().to_lowercase().chars() {
        if ch == '.' {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Apply the fixed rename table to an already-normalized header.
pub fn canonical_name(normalized: &str) -> String {
    RENAME_MAP
        .get(normalized)
        .map(|s| s.to_string())
        .unwrap_or_else(|| normalized.to_string())
}

/// Normalize a full header row. Blank headers become `unnamed_<n>` and
/// collisions get a numeric suffix so every column name stays unique.
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(idx, header)| {
            let mut base = canonical_name(&normalize_header(header));
            if base.is_empty() {
                base = format!("unnamed_{}", idx);
            }
            let mut name = base.clone();
            let mut suffix = 1;
            while taken.contains(&name) {
                suffix += 1;
                name = format!("{}_{}", base, suffix);
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Columns coerced to dates during consolidation.
pub fn is_date_column(name: &str) -> bool {
    name == "date_of_joining" || name == "doj" || name.starts_with("date_of_")
}

/// Coerce a cell to a calendar date. Unparseable values become `None`, never an error.
pub fn coerce_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d),
        CellValue::Number(n) => excel_serial_to_date(*n),
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Null => None,
    }
}

pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Office Location"), "office_location");
        assert_eq!(normalize_header("  sPInE Current status "), "spine_current_status");
        assert_eq!(normalize_header("Sr. No."), "sr_no");
        assert_eq!(normalize_header("Billable/Non-Billable"), "billable_non_billable");
        assert_eq!(normalize_header("Emplo+A514+A1+A1:N18"), "emplo_a514_a1_a1_n18");
    }

    #[test]
    fn test_rename_map() {
        let headers: Vec<String> = ["Emplo+A514+A1+A1:N18", "RM Name", "LWD", "Designation"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            normalize_headers(&headers),
            vec!["employee_id", "reporting_manager", "last_working_day", "designation"]
        );
    }

    #[test]
    fn test_blank_and_duplicate_headers() {
        let headers: Vec<String> = ["Name", "", "name"].iter().map(|s| s.to_string()).collect();
        assert_eq!(normalize_headers(&headers), vec!["name", "unnamed_1", "name_2"]);
    }

    #[test]
    fn test_suffix_skips_names_already_in_the_row() {
        let headers: Vec<String> = ["name", "name_2", "name", "Name"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            normalize_headers(&headers),
            vec!["name", "name_2", "name_3", "name_4"]
        );
    }

    #[test]
    fn test_coerce_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(coerce_date(&CellValue::Text("2024-03-01".into())), expected);
        assert_eq!(coerce_date(&CellValue::Text("01/03/2024".into())), expected);
        assert_eq!(coerce_date(&CellValue::Text("01-Mar-2024".into())), expected);
        assert_eq!(coerce_date(&CellValue::Text("2024-03-01 00:00:00".into())), expected);
        assert_eq!(coerce_date(&CellValue::Text("TBD".into())), None);
        assert_eq!(coerce_date(&CellValue::Null), None);
    }
}
