//! Error Classifier
//!
//! Classifies program failures into a taxonomy for recovery.

use crate::program::ProgramError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Program failure classification taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramErrorClass {
    MalformedProgram,
    ColumnNotFound,
    SnapshotNotFound,
    TypeMismatch,
    InvalidValue,
    ExecutionError(String),
}

impl fmt::Display for ProgramErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramErrorClass::MalformedProgram => write!(f, "MalformedProgram"),
            ProgramErrorClass::ColumnNotFound => write!(f, "ColumnNotFound"),
            ProgramErrorClass::SnapshotNotFound => write!(f, "SnapshotNotFound"),
            ProgramErrorClass::TypeMismatch => write!(f, "TypeMismatch"),
            ProgramErrorClass::InvalidValue => write!(f, "InvalidValue"),
            ProgramErrorClass::ExecutionError(msg) => write!(f, "ExecutionError({})", msg),
        }
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &ProgramError) -> ProgramErrorClass {
        match error {
            ProgramError::Malformed(_) => ProgramErrorClass::MalformedProgram,
            ProgramError::UnknownColumn { .. } => ProgramErrorClass::ColumnNotFound,
            ProgramError::UnknownSnapshot { .. } => ProgramErrorClass::SnapshotNotFound,
            ProgramError::TypeMismatch { .. } => ProgramErrorClass::TypeMismatch,
            ProgramError::InvalidValue(_) => ProgramErrorClass::InvalidValue,
            ProgramError::Table(msg) => ProgramErrorClass::ExecutionError(msg.clone()),
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_column_not_found() {
        let classifier = ErrorClassifier::new();
        let error = ProgramError::UnknownColumn {
            column: "salary".to_string(),
            available: "employee_id, designation".to_string(),
        };
        assert_eq!(classifier.classify(&error), ProgramErrorClass::ColumnNotFound);
    }

    #[test]
    fn test_classify_malformed() {
        let classifier = ErrorClassifier::new();
        let error = ProgramError::Malformed("expected value at line 1".to_string());
        assert_eq!(classifier.classify(&error), ProgramErrorClass::MalformedProgram);
    }
}
