//! Error Recovery
//!
//! Turns a classified program failure into the directive used by the single repair attempt.

use crate::execution_loop::error_classifier::{ErrorClassifier, ProgramErrorClass};
use crate::program::{ProgramError, ERROR_MARKER};

/// Everything the repair prompt needs about a failed program.
#[derive(Debug, Clone)]
pub struct RepairContext {
    pub failed_program: String,
    /// The error as users see it, `Error:` marker included.
    pub rendered_error: String,
    pub class: ProgramErrorClass,
    pub hint: String,
}

pub struct ErrorRecovery {
    classifier: ErrorClassifier,
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRecovery {
    pub fn new() -> Self {
        Self {
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn repair_context(&self, failed_program: &str, error: &ProgramError) -> RepairContext {
        let class = self.classifier.classify(error);
        RepairContext {
            failed_program: failed_program.to_string(),
            rendered_error: format!("{} {}", ERROR_MARKER, error),
            hint: Self::hint_for(&class),
            class,
        }
    }

    fn hint_for(class: &ProgramErrorClass) -> String {
        match class {
            ProgramErrorClass::MalformedProgram => {
                "Reply with a single JSON object with only the keys \"result\" and \"explanation\", using the expressions listed above."
            }
            ProgramErrorClass::ColumnNotFound => {
                "Use only column names exactly as listed in the schema."
            }
            ProgramErrorClass::SnapshotNotFound => {
                "Use \"latest\", \"all\" or one of the available report dates."
            }
            ProgramErrorClass::TypeMismatch => {
                "Ordering and aggregate operations need numeric or date columns; use eq, in or contains for text."
            }
            ProgramErrorClass::InvalidValue => {
                "Check the value shape: 'in' and 'not_in' take a list, 'eq' and 'ne' a single value."
            }
            ProgramErrorClass::ExecutionError(_) => "Simplify the program.",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_context_renders_marker() {
        let recovery = ErrorRecovery::new();
        let ctx = recovery.repair_context(
            "{\"result\": 1}",
            &ProgramError::InvalidValue("'in' on 'category' needs a list of values".into()),
        );
        assert!(ctx.rendered_error.starts_with("Error:"));
        assert_eq!(ctx.class, ProgramErrorClass::InvalidValue);
        assert!(ctx.hint.contains("take a list"));
    }
}
