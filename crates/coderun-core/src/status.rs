//! Error kinds and terminal outcomes of a task execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of everything that can go wrong around a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing or malformed request fields. Surfaced as HTTP 400.
    InvalidRequest,
    /// The per-task deadline elapsed.
    Timeout,
    /// Workspace setup, engine run or artifact enumeration failed.
    ExecutionFailure,
    /// A single artifact upload failed. Never fails the task.
    UploadFailure,
    /// Unexpected fault outside the execution pipeline. Surfaced as HTTP 500.
    InternalFault,
}

impl ErrorKind {
    /// Stable lowercase label, used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Timeout => "timeout",
            Self::ExecutionFailure => "execution_failure",
            Self::UploadFailure => "upload_failure",
            Self::InternalFault => "internal_fault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one admitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Engine run finished; artifacts were collected best-effort.
    Success,
    /// Pipeline aborted with an error.
    Failure,
    /// Deadline elapsed before the pipeline finished.
    Timeout,
}

impl Outcome {
    /// Stable lowercase label, used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }
}
