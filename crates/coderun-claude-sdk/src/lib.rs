//! Claude Code SDK for coderun
//!
//! This crate runs Claude Code agents as one-shot subprocesses and exposes
//! their stream-json output as a lazy [`MessageStream`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use coderun_claude_sdk::{ClaudeExecutor, ClaudeMessage, PermissionMode};
//! use tokio_stream::StreamExt;
//!
//! async fn run_agent() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = ClaudeExecutor::new("claude")
//!         .with_permission_mode(PermissionMode::AcceptEdits);
//!
//!     let mut stream = executor.execute(Path::new("."), "What is 2 + 2?")?;
//!     while let Some(message) = stream.next().await {
//!         if let ClaudeMessage::Result { num_turns, .. } = message? {
//!             println!("Finished after {:?} turns", num_turns);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod types;

// Re-export main types
pub use error::SdkError;
pub use executor::{ClaudeExecutor, MessageStream, DEFAULT_MAX_BUFFER_SIZE};
pub use types::{
    AssistantMessage, ClaudeMessage, ContentItem, PermissionMode, ToolData, UserMessage,
};
