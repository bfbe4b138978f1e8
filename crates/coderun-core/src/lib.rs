//! coderun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Filesystem
//! - Runtime specifics
//!
//! All types here describe a task request and the envelope that reports
//! how its execution ended.

pub mod error;
pub mod execution;
pub mod ids;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use execution::{timeout_message, Artifact, ExecutionResult};
pub use ids::TaskId;
pub use status::{ErrorKind, Outcome};
pub use task::{preview, TaskRequest};
