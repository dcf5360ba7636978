//! Autoscaler controller — mode state machine and hysteresis decisions.
//!
//! All mutable state (mode, paused stack, load window, last median and
//! action) sits behind one mutex. The lock is only ever held for plain
//! reads and writes; queue calls happen outside it, and the mode is
//! checked again as soon as each call returns.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use loadpilot_queue::QueueCommandPort;
use loadpilot_state::{AutoscaleConfig, AutoscalerState, Mode, TaskId};

use crate::window::LoadWindow;

/// Where a queue command comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Issued by the control loop; dropped while the mode is manual.
    Autoscaler,
    /// Issued on behalf of the operator; always executed.
    Operator,
}

/// A state-changing queue command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetConcurrency(u32),
    Pause(TaskId),
    Resume(TaskId),
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Manual mode: the sample was recorded, nothing else.
    Observed,
    /// Nothing running and concurrency already 1.
    Idle,
    /// Nothing running; concurrency was reset to 1.
    IdleReset { from: u32 },
    /// High load: the newest task was paused.
    Paused { task: TaskId, parallel: u32 },
    /// Recovery: the most recently paused task was resumed.
    Resumed { task: TaskId, parallel: u32 },
    /// Headroom: concurrency was raised.
    ScaledUp { parallel: u32 },
    /// No threshold crossed.
    Steady,
    /// The mode left `auto` while a queue call was in flight.
    Abandoned,
}

impl TickOutcome {
    fn is_action(&self) -> bool {
        matches!(
            self,
            TickOutcome::IdleReset { .. }
                | TickOutcome::Paused { .. }
                | TickOutcome::Resumed { .. }
                | TickOutcome::ScaledUp { .. }
        )
    }
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickOutcome::Observed => write!(f, "observed"),
            TickOutcome::Idle => write!(f, "idle"),
            TickOutcome::IdleReset { .. } => write!(f, "No running tasks → parallel=1"),
            TickOutcome::Paused { task, parallel } => {
                write!(f, "PAUSE #{task} → parallel={parallel}")
            }
            TickOutcome::Resumed { task, parallel } => {
                write!(f, "RESUME #{task} → parallel={parallel}")
            }
            TickOutcome::ScaledUp { parallel } => write!(f, "SCALE UP parallel={parallel}"),
            TickOutcome::Steady => write!(f, "steady"),
            TickOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

struct ControllerState {
    mode: Mode,
    /// Tasks this controller paused, most recent last.
    paused: Vec<TaskId>,
    window: LoadWindow,
    cpu_median: Option<f64>,
    last_action: Option<String>,
}

/// Owns the autoscaler state and drives the queue through `P`.
pub struct AutoscalerController<P> {
    port: P,
    config: AutoscaleConfig,
    state: Mutex<ControllerState>,
}

impl<P: QueueCommandPort> AutoscalerController<P> {
    /// Create a controller in manual mode.
    pub fn new(port: P, config: AutoscaleConfig) -> Self {
        Self {
            port,
            config,
            state: Mutex::new(ControllerState {
                mode: Mode::Manual,
                paused: Vec::new(),
                window: LoadWindow::new(),
                cpu_median: None,
                last_action: None,
            }),
        }
    }

    /// Start in `mode` instead of manual.
    pub fn with_mode(self, mode: Mode) -> Self {
        self.lock().mode = mode;
        self
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &AutoscaleConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    /// Snapshot for observers. The load window itself is not exposed.
    pub fn state(&self) -> AutoscalerState {
        let st = self.lock();
        AutoscalerState {
            mode: st.mode,
            paused_tasks: st.paused.clone(),
            cpu_median: st.cpu_median,
            last_action: st.last_action.clone(),
            config: self.config.clone(),
        }
    }

    /// Switch mode.
    ///
    /// Entering manual mode hands every task the autoscaler paused back to
    /// the queue, oldest pause first, and clears the stack. Returns the
    /// ids that were resumed.
    pub async fn set_mode(&self, mode: Mode) -> Vec<TaskId> {
        let released = {
            let mut st = self.lock();
            let previous = std::mem::replace(&mut st.mode, mode);
            if previous != mode {
                info!(from = %previous, to = %mode, "autoscaler mode changed");
            }
            if mode == Mode::Manual {
                std::mem::take(&mut st.paused)
            } else {
                Vec::new()
            }
        };

        for &task in &released {
            self.dispatch(Command::Resume(task), Origin::Operator).await;
        }
        if !released.is_empty() {
            info!(tasks = ?released, "resumed tasks paused by the autoscaler");
        }
        released
    }

    /// Operator concurrency change. Only accepted in manual mode; the
    /// value is clamped to the configured bounds. Returns the value sent.
    pub async fn set_concurrency(&self, value: i64) -> Option<u32> {
        if self.mode() != Mode::Manual {
            debug!(value, "ignoring concurrency change outside manual mode");
            return None;
        }
        let parallel = self.config.clamp_parallel(value);
        self.dispatch(Command::SetConcurrency(parallel), Origin::Operator)
            .await;
        info!(parallel, "manual concurrency set");
        Some(parallel)
    }

    /// Send `command` to the queue unless it is an autoscaler command and
    /// the mode is manual. Returns whether the command was sent; a queue
    /// failure is logged and still counts as sent.
    pub async fn dispatch(&self, command: Command, origin: Origin) -> bool {
        if origin == Origin::Autoscaler && self.mode() == Mode::Manual {
            warn!(?command, "blocked autoscaler command in manual mode");
            return false;
        }

        let result = match command {
            Command::SetConcurrency(parallel) => self.port.set_concurrency(parallel).await,
            Command::Pause(task) => self.port.pause(task).await,
            Command::Resume(task) => self.port.resume(task).await,
        };
        if let Err(e) = result {
            warn!(?command, ?origin, error = %e, "queue command failed");
        }
        true
    }

    /// Feed one CPU sample and, in auto mode, act on it.
    ///
    /// Never fails: queue errors degrade to the port's safe defaults.
    pub async fn tick(&self, cpu: f64) -> TickOutcome {
        let median = {
            let mut st = self.lock();
            st.window.push(cpu);
            st.cpu_median = st.window.median();
            st.last_action = None;
            if st.mode != Mode::Auto {
                return TickOutcome::Observed;
            }
            st.cpu_median.unwrap_or(cpu)
        };

        let running = self.port.running_task_ids().await;
        if !self.still_auto() {
            return self.abandon("listing running tasks");
        }

        let outcome = if running.is_empty() {
            self.idle_reset().await
        } else if cpu > self.config.cpu_high {
            if running.len() as u32 > self.config.min_parallel {
                self.shed(&running).await
            } else {
                TickOutcome::Steady
            }
        } else {
            // Popped under the same lock as the mode check, so a concurrent
            // switch to manual cannot also take this id.
            let (any_paused, due) = {
                let mut st = self.lock();
                let any_paused = !st.paused.is_empty();
                let due = if st.mode == Mode::Auto && median < self.config.cpu_resume {
                    st.paused.pop()
                } else {
                    None
                };
                (any_paused, due)
            };
            match due {
                Some(task) => self.recover(task).await,
                None if !any_paused && median < self.config.cpu_low => self.grow().await,
                None => TickOutcome::Steady,
            }
        };

        if outcome.is_action() {
            let action = outcome.to_string();
            info!(cpu, median, action = %action, "autoscaler acted");
            self.lock().last_action = Some(action);
        }
        outcome
    }

    /// Nothing is running: pull concurrency back to 1 so it cannot drift.
    async fn idle_reset(&self) -> TickOutcome {
        let current = self.port.current_concurrency().await;
        if !self.still_auto() {
            return self.abandon("reading concurrency");
        }
        if current == 1 {
            return TickOutcome::Idle;
        }
        if !self.dispatch(Command::SetConcurrency(1), Origin::Autoscaler).await {
            return self.abandon("idle reset");
        }
        TickOutcome::IdleReset { from: current }
    }

    /// High load: pause the task with the largest id.
    async fn shed(&self, running: &[TaskId]) -> TickOutcome {
        let Some(&victim) = running.iter().max() else {
            return TickOutcome::Steady;
        };
        if !self.dispatch(Command::Pause(victim), Origin::Autoscaler).await {
            return self.abandon("pause");
        }

        let tracked = {
            let mut st = self.lock();
            if st.mode == Mode::Auto {
                st.paused.push(victim);
                true
            } else {
                false
            }
        };
        if !tracked {
            // The switch to manual emptied the stack before this pause
            // landed, so nothing else will resume the task.
            self.dispatch(Command::Resume(victim), Origin::Operator).await;
            return self.abandon("pause");
        }

        let parallel = (running.len() as u32 - 1).max(self.config.min_parallel);
        if !self
            .dispatch(Command::SetConcurrency(parallel), Origin::Autoscaler)
            .await
        {
            return self.abandon("lowering concurrency");
        }
        TickOutcome::Paused {
            task: victim,
            parallel,
        }
    }

    /// Median back under the resume threshold: undo the latest pause.
    ///
    /// `task` is already off the stack. The resume goes out whatever the
    /// mode is by now; manual mode wants the task running too.
    async fn recover(&self, task: TaskId) -> TickOutcome {
        self.dispatch(Command::Resume(task), Origin::Operator).await;
        if !self.still_auto() {
            return self.abandon("resume");
        }

        let current = self.port.current_concurrency().await;
        if !self.still_auto() {
            return self.abandon("reading concurrency");
        }
        let parallel = (current + 1).min(self.config.max_parallel);
        if !self
            .dispatch(Command::SetConcurrency(parallel), Origin::Autoscaler)
            .await
        {
            return self.abandon("raising concurrency");
        }
        TickOutcome::Resumed { task, parallel }
    }

    /// Headroom with nothing paused: allow one more task.
    async fn grow(&self) -> TickOutcome {
        let current = self.port.current_concurrency().await;
        if !self.still_auto() {
            return self.abandon("reading concurrency");
        }
        if current >= self.config.max_parallel {
            return TickOutcome::Steady;
        }
        let parallel = current + 1;
        if !self
            .dispatch(Command::SetConcurrency(parallel), Origin::Autoscaler)
            .await
        {
            return self.abandon("raising concurrency");
        }
        TickOutcome::ScaledUp { parallel }
    }

    fn still_auto(&self) -> bool {
        self.lock().mode == Mode::Auto
    }

    fn abandon(&self, stage: &str) -> TickOutcome {
        debug!(stage, "mode left auto mid-tick, abandoning");
        TickOutcome::Abandoned
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use loadpilot_queue::{InMemoryQueue, QueueCall, QueueResult};
    use loadpilot_state::{QueueStatus, TaskStatus};
    use tokio::sync::Notify;

    fn controller(queue: &InMemoryQueue, mode: Mode) -> AutoscalerController<InMemoryQueue> {
        AutoscalerController::new(queue.clone(), AutoscaleConfig::default()).with_mode(mode)
    }

    /// Put tasks on the paused stack as if earlier ticks had paused them.
    fn seed_paused<P: QueueCommandPort>(ctrl: &AutoscalerController<P>, ids: &[TaskId]) {
        ctrl.lock().paused.extend_from_slice(ids);
    }

    fn paused_queue(ids: &[TaskId]) -> InMemoryQueue {
        let queue = InMemoryQueue::new();
        for &id in ids {
            queue.insert_task(id, TaskStatus::Paused { start: None });
        }
        queue
    }

    #[tokio::test]
    async fn manual_tick_only_records_the_median() {
        let queue = InMemoryQueue::with_running(&[1, 2, 3]);
        let ctrl = controller(&queue, Mode::Manual);

        assert_eq!(ctrl.tick(95.0).await, TickOutcome::Observed);
        assert_eq!(ctrl.tick(85.0).await, TickOutcome::Observed);

        assert!(queue.journal().is_empty());
        assert_eq!(ctrl.state().cpu_median, Some(90.0));
    }

    #[tokio::test]
    async fn high_load_pauses_the_largest_running_id() {
        let queue = InMemoryQueue::with_running(&[3, 8, 1, 5, 2]);
        let ctrl = controller(&queue, Mode::Auto);

        let outcome = ctrl.tick(85.0).await;

        assert_eq!(outcome, TickOutcome::Paused { task: 8, parallel: 4 });
        assert_eq!(
            queue.commands(),
            vec![QueueCall::Pause(8), QueueCall::SetConcurrency(4)]
        );
        let state = ctrl.state();
        assert_eq!(state.paused_tasks, vec![8]);
        assert_eq!(state.last_action.as_deref(), Some("PAUSE #8 → parallel=4"));
    }

    #[tokio::test]
    async fn high_load_at_min_parallel_does_nothing() {
        let queue = InMemoryQueue::with_running(&[4]);
        let ctrl = controller(&queue, Mode::Auto);

        assert_eq!(ctrl.tick(99.0).await, TickOutcome::Steady);
        assert!(queue.commands().is_empty());
    }

    #[tokio::test]
    async fn recovery_resumes_last_paused_first() {
        let queue = InMemoryQueue::with_running(&[1]);
        queue.insert_task(7, TaskStatus::Paused { start: None });
        queue.insert_task(3, TaskStatus::Paused { start: None });
        let ctrl = controller(&queue, Mode::Auto);
        seed_paused(&ctrl, &[7, 3]);

        let outcome = ctrl.tick(50.0).await;

        assert_eq!(outcome, TickOutcome::Resumed { task: 3, parallel: 2 });
        assert_eq!(
            queue.commands(),
            vec![QueueCall::Resume(3), QueueCall::SetConcurrency(2)]
        );
        assert_eq!(ctrl.state().paused_tasks, vec![7]);
    }

    #[tokio::test]
    async fn pause_then_recover_through_ticks() {
        let queue = InMemoryQueue::with_running(&[1, 3, 7]);
        let ctrl = controller(&queue, Mode::Auto);

        assert!(matches!(ctrl.tick(90.0).await, TickOutcome::Paused { task: 7, .. }));
        assert!(matches!(ctrl.tick(90.0).await, TickOutcome::Paused { task: 3, .. }));
        assert_eq!(ctrl.state().paused_tasks, vec![7, 3]);

        // The median needs a few quiet samples before it drops below 60.
        let mut resumed = Vec::new();
        for _ in 0..10 {
            if let TickOutcome::Resumed { task, .. } = ctrl.tick(20.0).await {
                resumed.push(task);
            }
        }
        assert_eq!(resumed, vec![3, 7]);
        assert!(ctrl.state().paused_tasks.is_empty());
    }

    #[tokio::test]
    async fn recovery_is_capped_at_max_parallel() {
        let queue = InMemoryQueue::with_running(&[1]);
        queue.insert_task(2, TaskStatus::Paused { start: None });
        queue.set_parallel(12);
        let ctrl = controller(&queue, Mode::Auto);
        seed_paused(&ctrl, &[2]);

        assert_eq!(
            ctrl.tick(10.0).await,
            TickOutcome::Resumed { task: 2, parallel: 12 }
        );
    }

    #[tokio::test]
    async fn idle_queue_resets_concurrency_to_one() {
        let queue = InMemoryQueue::new();
        queue.set_parallel(4);
        let ctrl = controller(&queue, Mode::Auto);

        assert_eq!(ctrl.tick(95.0).await, TickOutcome::IdleReset { from: 4 });
        assert_eq!(queue.commands(), vec![QueueCall::SetConcurrency(1)]);
        assert_eq!(queue.parallel(), 1);

        // Already at 1: nothing more to do.
        assert_eq!(ctrl.tick(95.0).await, TickOutcome::Idle);
        assert_eq!(queue.commands().len(), 1);
    }

    #[tokio::test]
    async fn headroom_grows_until_max_parallel() {
        let queue = InMemoryQueue::with_running(&[1]);
        queue.set_parallel(11);
        let ctrl = controller(&queue, Mode::Auto);

        assert_eq!(ctrl.tick(30.0).await, TickOutcome::ScaledUp { parallel: 12 });
        assert_eq!(ctrl.tick(30.0).await, TickOutcome::Steady);
        assert_eq!(queue.commands(), vec![QueueCall::SetConcurrency(12)]);
    }

    #[tokio::test]
    async fn band_between_thresholds_is_steady() {
        let queue = InMemoryQueue::with_running(&[1, 2]);
        let ctrl = controller(&queue, Mode::Auto);

        assert_eq!(ctrl.tick(70.0).await, TickOutcome::Steady);
        assert!(queue.commands().is_empty());
        assert_eq!(ctrl.state().last_action, None);
    }

    #[tokio::test]
    async fn last_action_is_cleared_by_the_next_tick() {
        let queue = InMemoryQueue::with_running(&[1]);
        let ctrl = controller(&queue, Mode::Auto);

        ctrl.tick(30.0).await;
        assert!(ctrl.state().last_action.is_some());
        ctrl.tick(70.0).await;
        ctrl.tick(70.0).await;
        assert_eq!(ctrl.state().last_action, None);
    }

    #[tokio::test]
    async fn queue_failures_stay_inside_the_tick() {
        let queue = InMemoryQueue::with_running(&[1, 2, 3]);
        queue.set_failing(true);
        let ctrl = controller(&queue, Mode::Auto);

        // Running ids fall back to empty and concurrency to 1.
        assert_eq!(ctrl.tick(95.0).await, TickOutcome::Idle);
        assert_eq!(ctrl.tick(10.0).await, TickOutcome::Idle);
        assert!(queue.commands().is_empty());
    }

    #[tokio::test]
    async fn switching_to_manual_resumes_each_paused_task_once() {
        let queue = paused_queue(&[7, 3]);
        let ctrl = controller(&queue, Mode::Auto);
        seed_paused(&ctrl, &[7, 3]);

        let released = ctrl.set_mode(Mode::Manual).await;

        assert_eq!(released, vec![7, 3]);
        assert_eq!(
            queue.commands(),
            vec![QueueCall::Resume(7), QueueCall::Resume(3)]
        );
        assert!(ctrl.state().paused_tasks.is_empty());
        assert_eq!(ctrl.mode(), Mode::Manual);

        // A second switch has nothing left to resume.
        assert!(ctrl.set_mode(Mode::Manual).await.is_empty());
        assert_eq!(queue.commands().len(), 2);
    }

    #[tokio::test]
    async fn switching_to_auto_keeps_the_queue_untouched() {
        let queue = InMemoryQueue::with_running(&[1]);
        let ctrl = controller(&queue, Mode::Manual);

        assert!(ctrl.set_mode(Mode::Auto).await.is_empty());
        assert!(queue.journal().is_empty());
        assert_eq!(ctrl.mode(), Mode::Auto);
    }

    #[tokio::test]
    async fn manual_concurrency_is_clamped_and_bypasses_the_filter() {
        let queue = InMemoryQueue::with_running(&[1]);
        let ctrl = controller(&queue, Mode::Manual);

        assert_eq!(ctrl.set_concurrency(50).await, Some(12));
        assert_eq!(ctrl.set_concurrency(-2).await, Some(1));
        assert_eq!(
            queue.commands(),
            vec![QueueCall::SetConcurrency(12), QueueCall::SetConcurrency(1)]
        );
    }

    #[tokio::test]
    async fn manual_concurrency_is_rejected_in_auto_mode() {
        let queue = InMemoryQueue::with_running(&[1]);
        let ctrl = controller(&queue, Mode::Auto);

        assert_eq!(ctrl.set_concurrency(4).await, None);
        assert!(queue.commands().is_empty());
    }

    #[tokio::test]
    async fn autoscaler_commands_are_dropped_in_manual_mode() {
        let queue = InMemoryQueue::with_running(&[1]);
        let ctrl = controller(&queue, Mode::Manual);

        assert!(!ctrl.dispatch(Command::SetConcurrency(3), Origin::Autoscaler).await);
        assert!(queue.commands().is_empty());

        assert!(ctrl.dispatch(Command::SetConcurrency(3), Origin::Operator).await);
        assert_eq!(queue.commands(), vec![QueueCall::SetConcurrency(3)]);
    }

    // ── Mode changes while a queue call is in flight ─────────────

    #[derive(Clone, Copy, PartialEq)]
    enum Gate {
        Status,
        Pause,
        Resume,
    }

    /// Delegates to an [`InMemoryQueue`] but parks the first call of one
    /// kind until the test releases it.
    #[derive(Clone)]
    struct GatedQueue {
        inner: InMemoryQueue,
        gate: Gate,
        armed: Arc<AtomicBool>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl GatedQueue {
        fn new(inner: InMemoryQueue, gate: Gate) -> Self {
            Self {
                inner,
                gate,
                armed: Arc::new(AtomicBool::new(true)),
                entered: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }
        }

        async fn hold(&self, gate: Gate) {
            if self.gate == gate && self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
    }

    impl QueueCommandPort for GatedQueue {
        async fn status(&self) -> QueueResult<QueueStatus> {
            self.hold(Gate::Status).await;
            self.inner.status().await
        }

        async fn set_concurrency(&self, parallel: u32) -> QueueResult<()> {
            self.inner.set_concurrency(parallel).await
        }

        async fn pause(&self, task_id: TaskId) -> QueueResult<()> {
            self.hold(Gate::Pause).await;
            self.inner.pause(task_id).await
        }

        async fn resume(&self, task_id: TaskId) -> QueueResult<()> {
            self.hold(Gate::Resume).await;
            self.inner.resume(task_id).await
        }

        async fn clean_finished(&self) -> QueueResult<()> {
            self.inner.clean_finished().await
        }

        async fn task_log(&self, task_id: TaskId, lines: usize) -> QueueResult<String> {
            self.inner.task_log(task_id, lines).await
        }
    }

    fn resumes_of(queue: &InMemoryQueue, task: TaskId) -> usize {
        queue
            .commands()
            .iter()
            .filter(|&c| *c == QueueCall::Resume(task))
            .count()
    }

    #[tokio::test]
    async fn switch_to_manual_during_status_abandons_the_tick() {
        let queue = InMemoryQueue::with_running(&[1, 2, 3]);
        let gated = GatedQueue::new(queue.clone(), Gate::Status);
        let ctrl = Arc::new(
            AutoscalerController::new(gated.clone(), AutoscaleConfig::default())
                .with_mode(Mode::Auto),
        );

        let tick = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick(95.0).await }
        });

        gated.entered.notified().await;
        ctrl.set_mode(Mode::Manual).await;
        gated.release.notify_one();

        assert_eq!(tick.await.unwrap(), TickOutcome::Abandoned);
        assert!(queue.commands().is_empty());
        assert!(ctrl.state().paused_tasks.is_empty());
    }

    #[tokio::test]
    async fn switch_to_manual_during_pause_hands_the_task_back() {
        let queue = InMemoryQueue::with_running(&[1, 2, 3]);
        let gated = GatedQueue::new(queue.clone(), Gate::Pause);
        let ctrl = Arc::new(
            AutoscalerController::new(gated.clone(), AutoscaleConfig::default())
                .with_mode(Mode::Auto),
        );

        let tick = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick(95.0).await }
        });

        gated.entered.notified().await;
        assert!(ctrl.set_mode(Mode::Manual).await.is_empty());
        gated.release.notify_one();

        assert_eq!(tick.await.unwrap(), TickOutcome::Abandoned);
        assert_eq!(
            queue.commands(),
            vec![QueueCall::Pause(3), QueueCall::Resume(3)]
        );
        assert!(matches!(queue.task_status(3), Some(TaskStatus::Running { .. })));
        assert!(ctrl.state().paused_tasks.is_empty());
    }

    #[tokio::test]
    async fn switch_to_manual_before_recovery_resumes_the_whole_stack() {
        let queue = paused_queue(&[7, 3]);
        queue.insert_task(1, TaskStatus::Running { start: None });
        let gated = GatedQueue::new(queue.clone(), Gate::Status);
        let ctrl = Arc::new(
            AutoscalerController::new(gated.clone(), AutoscaleConfig::default())
                .with_mode(Mode::Auto),
        );
        seed_paused(&ctrl, &[7, 3]);

        let tick = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick(50.0).await }
        });

        gated.entered.notified().await;
        assert_eq!(ctrl.set_mode(Mode::Manual).await, vec![7, 3]);
        gated.release.notify_one();

        assert_eq!(tick.await.unwrap(), TickOutcome::Abandoned);
        assert_eq!(resumes_of(&queue, 7), 1);
        assert_eq!(resumes_of(&queue, 3), 1);
        assert_eq!(queue.commands().len(), 2);
        assert!(ctrl.state().paused_tasks.is_empty());
    }

    #[tokio::test]
    async fn switch_to_manual_during_recovery_resumes_each_task_once() {
        let queue = paused_queue(&[7, 3]);
        queue.insert_task(1, TaskStatus::Running { start: None });
        let gated = GatedQueue::new(queue.clone(), Gate::Resume);
        let ctrl = Arc::new(
            AutoscalerController::new(gated.clone(), AutoscaleConfig::default())
                .with_mode(Mode::Auto),
        );
        seed_paused(&ctrl, &[7, 3]);

        let tick = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick(50.0).await }
        });

        // Task 3 is already off the stack while its resume is pending.
        gated.entered.notified().await;
        assert_eq!(ctrl.set_mode(Mode::Manual).await, vec![7]);
        gated.release.notify_one();

        assert_eq!(tick.await.unwrap(), TickOutcome::Abandoned);
        assert_eq!(resumes_of(&queue, 7), 1);
        assert_eq!(resumes_of(&queue, 3), 1);
        assert!(matches!(queue.task_status(3), Some(TaskStatus::Running { .. })));
        assert!(matches!(queue.task_status(7), Some(TaskStatus::Running { .. })));
        assert!(ctrl.state().paused_tasks.is_empty());
        // The abandoned recovery never touched concurrency.
        assert_eq!(queue.parallel(), 1);
    }
}
