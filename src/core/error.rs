use chrono::NaiveDate;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Infeasible constraint: {0}")]
    InfeasibleConstraint(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("IRR solve failed for window {start}..{end}: {reason}")]
    IrrFailed {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("Price data error: {0}")]
    DataSource(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    InvalidRequest,
    Infeasible,
    Internal,
}

impl EngineError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::InvalidInput { .. } | EngineError::UnknownAsset(_) => {
                ErrorCategory::InvalidRequest
            }
            EngineError::InfeasibleConstraint(_) => ErrorCategory::Infeasible,
            EngineError::InsufficientData(_)
            | EngineError::IrrFailed { .. }
            | EngineError::DataSource(_) => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_separate_bad_input_from_internal_failures() {
        assert_eq!(
            EngineError::invalid("current_age", "must be > 0").category(),
            ErrorCategory::InvalidRequest
        );
        assert_eq!(
            EngineError::UnknownAsset("gold".into()).category(),
            ErrorCategory::InvalidRequest
        );
        assert_eq!(
            EngineError::InfeasibleConstraint("reserve".into()).category(),
            ErrorCategory::Infeasible
        );
        assert_eq!(
            EngineError::InsufficientData("no windows".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn invalid_input_message_names_the_field() {
        let err = EngineError::invalid("retirement_age", "must be > current_age");
        assert_eq!(
            err.to_string(),
            "Invalid input: retirement_age - must be > current_age"
        );
    }
}
