//! Result values produced by executing a program.

use crate::table::cell::format_number;
use serde::Serialize;
use std::fmt;

/// Longest bar drawn by the text chart rendering.
const CHART_WIDTH: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResultValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
    Table(TableValue),
    Breakdown(Breakdown),
    Chart(ChartValue),
    Named(Vec<(String, ResultValue)>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableValue {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows matched before the display limit was applied.
    pub total_rows: usize,
}

/// Per-value counts for one column. `total` is the sum of the entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub column: String,
    pub entries: Vec<(String, f64)>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartValue {
    pub kind: super::ChartKind,
    pub title: String,
    pub data: Breakdown,
}

impl ResultValue {
    /// Empty results are reported as "No result found" by the orchestrator.
    pub fn is_empty(&self) -> bool {
        match self {
            ResultValue::Number(_) => false,
            ResultValue::Text(s) => s.trim().is_empty(),
            ResultValue::List(items) => items.is_empty(),
            ResultValue::Table(t) => t.rows.is_empty(),
            ResultValue::Breakdown(b) => b.entries.is_empty(),
            ResultValue::Chart(c) => c.data.entries.is_empty(),
            ResultValue::Named(items) => items.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON literal into a value. `null` and empty strings have no value.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ResultValue::Text(b.to_string())),
            Value::Number(n) => n.as_f64().map(ResultValue::Number),
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(ResultValue::Text(s.clone())),
            Value::Array(items) => Some(ResultValue::List(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            Value::Object(map) => Some(ResultValue::Named(
                map.iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|rv| (k.clone(), rv)))
                    .collect(),
            )),
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Number(n) => write!(f, "{}", format_number(*n)),
            ResultValue::Text(s) => write!(f, "{}", s),
            ResultValue::List(items) => write!(f, "{}", items.join(", ")),
            ResultValue::Table(t) => write!(f, "{}", t),
            ResultValue::Breakdown(b) => write!(f, "{}", b),
            ResultValue::Chart(c) => write!(f, "{}", c),
            ResultValue::Named(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|(label, value)| format!("{}: {}", label, value))
                    .collect();
                write!(f, "{}", parts.join("; "))
            }
        }
    }
}

impl fmt::Display for TableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "| {} |", self.columns.join(" | "))?;
        writeln!(
            f,
            "|{}|",
            self.columns.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        )?;
        for row in &self.rows {
            writeln!(f, "| {} |", row.join(" | "))?;
        }
        if self.total_rows > self.rows.len() {
            write!(f, "({} of {} rows shown)", self.rows.len(), self.total_rows)?;
        }
        Ok(())
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, count) in &self.entries {
            writeln!(f, "{}: {}", label, format_number(*count))?;
        }
        write!(f, "Total: {}", format_number(self.total))
    }
}

impl fmt::Display for ChartValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({:?} chart)", self.title, self.kind)?;
        let max = self
            .data
            .entries
            .iter()
            .map(|(_, v)| *v)
            .fold(0.0_f64, f64::max);
        let label_width = self
            .data
            .entries
            .iter()
            .map(|(l, _)| l.chars().count())
            .max()
            .unwrap_or(0);
        for (label, value) in &self.data.entries {
            let bar = if max > 0.0 {
                ((value / max) * CHART_WIDTH as f64).round() as usize
            } else {
                0
            };
            writeln!(
                f,
                "{:<width$} | {} {}",
                label,
                "#".repeat(bar),
                format_number(*value),
                width = label_width
            )?;
        }
        write!(f, "Total: {}", format_number(self.data.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_literal() {
        assert_eq!(ResultValue::from_json(&json!(null)), None);
        assert_eq!(ResultValue::from_json(&json!("")), None);
        assert_eq!(
            ResultValue::from_json(&json!(3)),
            Some(ResultValue::Number(3.0))
        );
        assert_eq!(
            ResultValue::from_json(&json!(["a", 1])),
            Some(ResultValue::List(vec!["a".into(), "1".into()]))
        );
    }

    #[test]
    fn test_breakdown_display() {
        let b = Breakdown {
            column: "office_location".into(),
            entries: vec![("Delhi".into(), 3.0), ("Delhi-NCR".into(), 2.0)],
            total: 5.0,
        };
        assert_eq!(b.to_string(), "Delhi: 3\nDelhi-NCR: 2\nTotal: 5");
    }

    #[test]
    fn test_named_display() {
        let v = ResultValue::Named(vec![
            ("Consultant".into(), ResultValue::Number(4.0)),
            ("Senior Consultant".into(), ResultValue::Number(2.0)),
        ]);
        assert_eq!(v.to_string(), "Consultant: 4; Senior Consultant: 2");
    }

    #[test]
    fn test_emptiness() {
        assert!(ResultValue::List(vec![]).is_empty());
        assert!(!ResultValue::Number(0.0).is_empty());
    }
}
