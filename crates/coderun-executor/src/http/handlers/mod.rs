//! HTTP request handlers.

mod execute;
mod observability;

pub use execute::execute_task;
pub use observability::{health, metrics};
