//! Core domain errors.

use thiserror::Error;

/// Core domain errors for coderun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request body is not a JSON object.
    #[error("Invalid JSON body")]
    InvalidBody,

    /// A required request field is absent or empty.
    #[error("Missing '{0}' field")]
    MissingField(&'static str),

    /// A request field is present but unusable.
    #[error("Invalid '{field}' field")]
    InvalidField { field: &'static str, reason: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Why a field was rejected, beyond the client-facing message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::InvalidField { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_keeps_reason_out_of_message() {
        let err = CoreError::InvalidField {
            field: "taskId",
            reason: "must be a string".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid 'taskId' field");
        assert_eq!(err.detail(), Some("must be a string"));
        assert_eq!(CoreError::MissingField("task").detail(), None);
    }
}
