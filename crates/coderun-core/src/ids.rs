//! Newtype wrapper for task identifiers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Prefix applied to generated task identifiers.
pub const GENERATED_TASK_ID_PREFIX: &str = "cc";

/// Longest caller-supplied task identifier we accept.
pub const MAX_TASK_ID_LEN: usize = 128;

/// Unique identifier for a Task.
///
/// A task id doubles as the name of the task's workspace directory, so
/// every value must be a single, safe path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Validate a caller-supplied identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();

        if id.is_empty() || id.len() > MAX_TASK_ID_LEN {
            return Err(CoreError::InvalidInput(format!(
                "task id must be 1..={} characters",
                MAX_TASK_ID_LEN
            )));
        }
        if id == "." || id == ".." {
            return Err(CoreError::InvalidInput(format!(
                "task id '{}' is reserved",
                id
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(CoreError::InvalidInput(format!(
                "task id contains invalid character {:?}",
                c
            )));
        }

        Ok(Self(id))
    }

    /// Generate a new TaskId.
    ///
    /// Format is `cc-<unix millis>-<8 hex chars>`; the random suffix keeps
    /// ids distinct when several tasks arrive within the same millisecond.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            GENERATED_TASK_ID_PREFIX,
            millis,
            &suffix[..8]
        ))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for TaskId {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
