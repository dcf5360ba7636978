//! The queue command interface.

use std::future::Future;

use tracing::warn;

use loadpilot_state::{QueueStatus, TaskId};

use crate::error::QueueResult;

/// Number of log lines fetched for a task when none is specified.
pub const DEFAULT_LOG_LINES: usize = 80;

/// Commands the autoscaler and observers may send to the task queue.
///
/// Implementations must bound every call in time; a hung queue process
/// surfaces as an error, never as a future that does not resolve.
/// Pausing a task that is not running (or resuming one that is not
/// paused) is a remote no-op and is not reported as an error.
pub trait QueueCommandPort: Clone + Send + Sync + 'static {
    /// Query groups and tasks.
    fn status(&self) -> impl Future<Output = QueueResult<QueueStatus>> + Send;

    /// Set the default group's concurrency.
    fn set_concurrency(&self, parallel: u32) -> impl Future<Output = QueueResult<()>> + Send;

    fn pause(&self, task_id: TaskId) -> impl Future<Output = QueueResult<()>> + Send;

    /// Resume a paused task (or start a queued one).
    fn resume(&self, task_id: TaskId) -> impl Future<Output = QueueResult<()>> + Send;

    /// Remove finished tasks from the queue.
    fn clean_finished(&self) -> impl Future<Output = QueueResult<()>> + Send;

    /// The last `lines` lines of a task's output.
    fn task_log(
        &self,
        task_id: TaskId,
        lines: usize,
    ) -> impl Future<Output = QueueResult<String>> + Send;

    /// Running task ids in ascending order, or empty if the queue
    /// could not be queried.
    fn running_task_ids(&self) -> impl Future<Output = Vec<TaskId>> + Send {
        async move {
            match self.status().await {
                Ok(status) => status.running_ids(),
                Err(e) => {
                    warn!(error = %e, "listing running tasks failed");
                    Vec::new()
                }
            }
        }
    }

    /// The default group's concurrency, or 1 if it could not be read.
    fn current_concurrency(&self) -> impl Future<Output = u32> + Send {
        async move {
            match self.status().await {
                Ok(status) => status.default_parallel().unwrap_or(1),
                Err(e) => {
                    warn!(error = %e, "reading concurrency failed");
                    1
                }
            }
        }
    }
}
