//! Error types for queue commands.

use std::time::Duration;

use loadpilot_state::TaskId;
use thiserror::Error;

/// Result type alias for queue port operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while talking to the external queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with code {code:?}: {stderr}")]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("malformed status output: {0}")]
    Decode(String),

    #[error("task {0} not found")]
    UnknownTask(TaskId),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}
