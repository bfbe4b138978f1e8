//! Execution result envelope and artifact records.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::status::{ErrorKind, Outcome};

/// An uploaded output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Base name of the file inside the workspace.
    pub filename: String,

    /// URL returned by the storage endpoint.
    pub url: String,
}

impl Artifact {
    /// Create a new Artifact.
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }
}

/// Uniform result of one task execution.
///
/// Exactly one of `result` and `error` is populated. Use the constructors
/// rather than building the struct by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Uploaded artifacts. Present on success, omitted on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock time of the execution in milliseconds.
    pub duration_ms: u64,

    /// Error classification; not part of the wire format.
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionResult {
    /// Successful run. `result` may be empty for command-only tasks.
    pub fn success(result: impl Into<String>, artifacts: Vec<Artifact>, duration_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            artifacts: Some(artifacts),
            error: None,
            duration_ms,
            error_kind: None,
        }
    }

    /// Failed run; `error` is passed through to the caller verbatim.
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            artifacts: None,
            error: Some(error.into()),
            duration_ms,
            error_kind: Some(ErrorKind::ExecutionFailure),
        }
    }

    /// The deadline `timeout` elapsed before the execution finished.
    pub fn timeout(timeout: Duration, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            artifacts: None,
            error: Some(timeout_message(timeout)),
            duration_ms,
            error_kind: Some(ErrorKind::Timeout),
        }
    }

    /// Uploaded artifacts, empty on failure.
    pub fn artifacts(&self) -> &[Artifact] {
        self.artifacts.as_deref().unwrap_or_default()
    }

    /// Terminal outcome for logging and metrics.
    pub fn outcome(&self) -> Outcome {
        match (self.success, self.error_kind) {
            (true, _) => Outcome::Success,
            (false, Some(ErrorKind::Timeout)) => Outcome::Timeout,
            (false, _) => Outcome::Failure,
        }
    }
}

/// Fixed error text reported when a task exceeds its deadline.
pub fn timeout_message(timeout: Duration) -> String {
    format!("Task timed out after {:?}", timeout)
}
