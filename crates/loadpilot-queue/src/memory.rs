//! In-memory queue.
//!
//! A small task table that behaves like the real queue for the commands
//! loadpilot issues. Recent calls are journaled so tests can assert exactly
//! which commands were sent, and failures can be switched on to exercise
//! the fallback paths. `loadpilotd --dry-run` also runs against it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use loadpilot_state::{DEFAULT_GROUP, GroupSummary, QueueStatus, TaskId, TaskInfo, TaskStatus};

use crate::error::{QueueError, QueueResult};
use crate::port::QueueCommandPort;

/// Calls kept in the journal; older ones are dropped.
pub const JOURNAL_CAPACITY: usize = 1024;

/// A call received by [`InMemoryQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCall {
    Status,
    SetConcurrency(u32),
    Pause(TaskId),
    Resume(TaskId),
    CleanFinished,
    TaskLog(TaskId),
}

impl QueueCall {
    /// Whether the call changes queue state (as opposed to reading it).
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            QueueCall::SetConcurrency(_)
                | QueueCall::Pause(_)
                | QueueCall::Resume(_)
                | QueueCall::CleanFinished
        )
    }
}

struct Inner {
    tasks: BTreeMap<TaskId, TaskStatus>,
    parallel: u32,
    logs: BTreeMap<TaskId, String>,
    journal: VecDeque<QueueCall>,
    failing: bool,
}

/// Shared, cloneable in-process queue.
#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryQueue {
    /// An empty queue with concurrency 1.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tasks: BTreeMap::new(),
                parallel: 1,
                logs: BTreeMap::new(),
                journal: VecDeque::with_capacity(JOURNAL_CAPACITY),
                failing: false,
            })),
        }
    }

    /// A queue with the given tasks running and concurrency set to match.
    pub fn with_running(ids: &[TaskId]) -> Self {
        let queue = Self::new();
        for &id in ids {
            queue.insert_task(id, TaskStatus::Running { start: None });
        }
        queue.set_parallel(ids.len().max(1) as u32);
        queue
    }

    pub fn insert_task(&self, id: TaskId, status: TaskStatus) {
        self.lock().tasks.insert(id, status);
    }

    /// Set concurrency without journaling it.
    pub fn set_parallel(&self, parallel: u32) {
        self.lock().parallel = parallel;
    }

    pub fn set_log(&self, id: TaskId, log: impl Into<String>) {
        self.lock().logs.insert(id, log.into());
    }

    /// Make every subsequent call fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn parallel(&self) -> u32 {
        self.lock().parallel
    }

    pub fn task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.lock().tasks.get(&id).cloned()
    }

    /// The most recent calls received, oldest first.
    pub fn journal(&self) -> Vec<QueueCall> {
        self.lock().journal.iter().cloned().collect()
    }

    /// Only the state-changing calls in the journal.
    pub fn commands(&self) -> Vec<QueueCall> {
        self.lock()
            .journal
            .iter()
            .filter(|c| c.is_command())
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not take the other tests down with it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Journal `call`, then fail if failure injection is on.
    fn record(&self, call: QueueCall) -> QueueResult<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        if inner.journal.len() == JOURNAL_CAPACITY {
            inner.journal.pop_front();
        }
        inner.journal.push_back(call);
        if inner.failing {
            return Err(QueueError::Unavailable("in-memory queue set to fail".to_string()));
        }
        Ok(inner)
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("InMemoryQueue")
            .field("tasks", &inner.tasks.len())
            .field("parallel", &inner.parallel)
            .finish_non_exhaustive()
    }
}

impl QueueCommandPort for InMemoryQueue {
    async fn status(&self) -> QueueResult<QueueStatus> {
        let inner = self.record(QueueCall::Status)?;
        let mut groups = BTreeMap::new();
        groups.insert(
            DEFAULT_GROUP.to_string(),
            GroupSummary {
                status: "Running".to_string(),
                parallel: inner.parallel,
            },
        );
        let tasks = inner
            .tasks
            .iter()
            .rev()
            .map(|(&id, status)| TaskInfo {
                id,
                command: format!("task-{id}"),
                path: "/".to_string(),
                status: status.clone(),
            })
            .collect();
        Ok(QueueStatus { groups, tasks })
    }

    async fn set_concurrency(&self, parallel: u32) -> QueueResult<()> {
        let mut inner = self.record(QueueCall::SetConcurrency(parallel))?;
        inner.parallel = parallel;
        Ok(())
    }

    async fn pause(&self, task_id: TaskId) -> QueueResult<()> {
        let mut inner = self.record(QueueCall::Pause(task_id))?;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(QueueError::UnknownTask(task_id))?;
        if let TaskStatus::Running { start } = *task {
            *task = TaskStatus::Paused { start };
        }
        Ok(())
    }

    async fn resume(&self, task_id: TaskId) -> QueueResult<()> {
        let mut inner = self.record(QueueCall::Resume(task_id))?;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(QueueError::UnknownTask(task_id))?;
        match *task {
            TaskStatus::Paused { start } => *task = TaskStatus::Running { start },
            TaskStatus::Queued | TaskStatus::Stashed => *task = TaskStatus::Running { start: None },
            _ => {}
        }
        Ok(())
    }

    async fn clean_finished(&self) -> QueueResult<()> {
        let mut inner = self.record(QueueCall::CleanFinished)?;
        inner.tasks.retain(|_, status| !status.is_done());
        Ok(())
    }

    async fn task_log(&self, task_id: TaskId, lines: usize) -> QueueResult<String> {
        let inner = self.record(QueueCall::TaskLog(task_id))?;
        if !inner.tasks.contains_key(&task_id) {
            return Err(QueueError::UnknownTask(task_id));
        }
        let log = inner.logs.get(&task_id).map(String::as_str).unwrap_or("");
        let all: Vec<&str> = log.lines().collect();
        let tail = &all[all.len().saturating_sub(lines)..];
        Ok(tail.join("\n"))
    }
}
