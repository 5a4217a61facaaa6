//! Cell Values
//!
//! A small owned value model shared by ingestion (spreadsheet/CSV cells) and the
//! executor (values read back out of the polars frame).

use chrono::{Datelike, Duration, NaiveDate};
use polars::prelude::AnyValue;
use std::fmt;

/// Days between 0001-01-01 (CE) and 1970-01-01, the polars `Date` epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl CellValue {
    /// Build a cell from raw text, treating blank strings as null.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            CellValue::Null
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    /// Coerce a CSV field: numbers become `Number`, everything else stays text.
    pub fn from_csv_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Convert a polars value back into a cell.
    pub fn from_any_value(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => CellValue::Null,
            AnyValue::Boolean(b) => CellValue::Text(b.to_string()),
            AnyValue::String(s) => CellValue::Text(s.to_string()),
            AnyValue::Int8(v) => CellValue::Number(v as f64),
            AnyValue::Int16(v) => CellValue::Number(v as f64),
            AnyValue::Int32(v) => CellValue::Number(v as f64),
            AnyValue::Int64(v) => CellValue::Number(v as f64),
            AnyValue::UInt8(v) => CellValue::Number(v as f64),
            AnyValue::UInt16(v) => CellValue::Number(v as f64),
            AnyValue::UInt32(v) => CellValue::Number(v as f64),
            AnyValue::UInt64(v) => CellValue::Number(v as f64),
            AnyValue::Float32(v) => CellValue::Number(v as f64),
            AnyValue::Float64(v) => CellValue::Number(v),
            AnyValue::Date(days) => days_to_date(days)
                .map(CellValue::Date)
                .unwrap_or(CellValue::Null),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Render a number without a trailing `.0` for whole values and with at most two decimals otherwise.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let fixed = format!("{:.2}", n);
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

/// Convert an Excel serial day number (1900 date system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_days_roundtrip_anchor() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        let d = NaiveDate::from_ymd_opt(2025, 10, 16).unwrap();
        assert_eq!(days_to_date(date_to_days(d)), Some(d));
    }

    #[test]
    fn test_excel_serial() {
        assert_eq!(
            excel_serial_to_date(45946.0),
            NaiveDate::from_ymd_opt(2025, 10, 16)
        );
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(3.3333), "3.33");
    }

    #[test]
    fn test_csv_field_coercion() {
        assert_eq!(CellValue::from_csv_field(" 1001 "), CellValue::Number(1001.0));
        assert_eq!(CellValue::from_csv_field("Delhi"), CellValue::Text("Delhi".into()));
        assert_eq!(CellValue::from_csv_field("   "), CellValue::Null);
    }
}
