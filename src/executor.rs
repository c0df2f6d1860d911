//! Cancellable single-worker motion execution.
//!
//! One background tokio task drains a depth-1 "latest submission wins" slot.
//! Callers never block: [`MotionExecutor::submit`] swaps shared state under a
//! short-held lock and returns immediately. Suspension points exist only
//! inside the worker, between steps and while waiting out inter-step delays;
//! both are `select!`s over the task's cancel signal and a chunked sleep, so
//! cancellation latency stays in the low milliseconds without a spin loop.
//!
//! Each task carries two independent signals with documented precedence:
//! `locked` and `interrupt requested`. The lock wins: a locked task ignores
//! its interrupt signal until the lock is released. Submissions arriving
//! while a locked task runs land in a single pending slot (newest wins) and
//! are promoted when the task reaches any terminal state.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use nalgebra::Vector2;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::actuator::Actuator;
use crate::callback::{CallbackRegistry, CoordinatorEvent};
use crate::planner::MotionPlan;

/// Predicate polled between and within steps; `true` stops the remaining
/// steps and completes the task early (used to pre-empt a long motion when an
/// activation is imminent).
pub type InterruptPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Lifecycle of a motion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Accepted, waiting for the worker.
    Queued,
    /// Steps are being executed.
    Running,
    /// All steps executed, or pre-empted by the interrupt predicate.
    Completed,
    /// Aborted by an actuation failure or a worker fault.
    Interrupted,
    /// Cancelled in favor of a newer submission.
    Superseded,
}

/// Outcome of a submission, reported to the caller immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was running; the worker picks this up at once.
    Started,
    /// An unlocked task was cancelled in favor of this submission.
    Superseding,
    /// A locked task is running; the submission waits in the pending slot.
    /// `replaced` is true when it displaced an older pending submission.
    Staged { replaced: bool },
}

/// Cancellation signal: a flag plus a notify so waiters wake promptly.
#[derive(Debug, Default)]
struct CancelSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// One submission occupying the latest-wins slot.
struct Submission {
    plan: MotionPlan,
    locked: bool,
}

/// Worker-side view of the task currently executing.
struct RunningTask {
    id: u64,
    target: Vector2<f64>,
    locked: Arc<AtomicBool>,
    cancel: Arc<CancelSignal>,
    started: Instant,
}

/// Shared task/lock/pending state; the only lock in the executor, never held
/// across an actuation call or a delay.
struct ExecState {
    slot: Option<Submission>,
    pending: Option<Submission>,
    running: Option<RunningTask>,
    next_id: u64,
    last_finished: Option<(u64, TaskStatus)>,
}

struct ExecShared {
    state: Mutex<ExecState>,
    wakeup: Notify,
    shutdown: AtomicBool,
    actuator: Arc<dyn Actuator>,
    interrupt: InterruptPredicate,
    callbacks: Arc<CallbackRegistry>,
    poll_interval: Duration,
    submitted: AtomicU64,
    completed: AtomicU64,
    superseded: AtomicU64,
    interrupted: AtomicU64,
    move_failures: AtomicU64,
    worker_faults: AtomicU64,
}

/// Snapshot of the running task for status queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningInfo {
    pub task_id: u64,
    pub target: Vector2<f64>,
    pub locked: bool,
    pub elapsed: Duration,
}

/// Status snapshot of the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorStatus {
    /// The task currently executing, if any.
    pub running: Option<RunningInfo>,
    /// A submission is waiting in the latest-wins slot.
    pub has_queued: bool,
    /// A submission is staged behind a locked task.
    pub has_pending: bool,
    /// Id and status of the most recently finished task.
    pub last_finished: Option<(u64, TaskStatus)>,
    /// Tasks accepted over the executor's lifetime.
    pub submitted: u64,
    /// Tasks that ran to completion (including pre-empted ones).
    pub completed: u64,
    /// Tasks cancelled by newer submissions.
    pub superseded: u64,
    /// Tasks aborted by actuation failures or worker faults.
    pub interrupted: u64,
    /// Individual move calls rejected by the actuator.
    pub move_failures: u64,
    /// Panics caught at the worker boundary.
    pub worker_faults: u64,
}

/// Single-worker, cancellable runner for [`MotionPlan`]s.
pub struct MotionExecutor {
    shared: Arc<ExecShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MotionExecutor {
    /// Spawn the worker. Must be called within a tokio runtime.
    pub fn spawn(
        actuator: Arc<dyn Actuator>,
        interrupt: InterruptPredicate,
        callbacks: Arc<CallbackRegistry>,
        poll_interval: Duration,
    ) -> Self {
        let shared = Arc::new(ExecShared {
            state: Mutex::new(ExecState {
                slot: None,
                pending: None,
                running: None,
                next_id: 0,
                last_finished: None,
            }),
            wakeup: Notify::new(),
            shutdown: AtomicBool::new(false),
            actuator,
            interrupt,
            callbacks,
            poll_interval,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
            move_failures: AtomicU64::new(0),
            worker_faults: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let worker = tokio::spawn(async move {
            worker_loop(worker_shared).await;
        });

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit a plan for execution. Non-blocking; returns immediately.
    ///
    /// If nothing is running the worker starts at once. If an unlocked task
    /// is running it is superseded. If a locked task is running the
    /// submission is staged in the single pending slot, displacing any older
    /// pending submission.
    pub fn submit(&self, plan: MotionPlan, locked: bool) -> SubmitOutcome {
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        let submission = Submission { plan, locked };

        let outcome = {
            let mut state = self.shared.state.lock().unwrap();
            let running = state.running.as_ref().map(|r| {
                (r.locked.load(Ordering::SeqCst), r.cancel.clone())
            });
            match running {
                Some((true, _)) => {
                    let replaced = state.pending.replace(submission).is_some();
                    SubmitOutcome::Staged { replaced }
                }
                Some((false, cancel)) => {
                    cancel.request();
                    state.slot = Some(submission);
                    SubmitOutcome::Superseding
                }
                None => {
                    state.slot = Some(submission);
                    SubmitOutcome::Started
                }
            }
        };

        self.shared.wakeup.notify_one();
        outcome
    }

    /// Force-release the lock on the running task.
    ///
    /// The pending submission, if any, is promoted immediately: it cancels
    /// the now-unlocked task and takes the slot. Returns true if a lock was
    /// actually cleared.
    pub fn force_unlock(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let unlocked = match &state.running {
            Some(running) if running.locked.swap(false, Ordering::SeqCst) => {
                Some((running.id, running.cancel.clone()))
            }
            _ => None,
        };
        let Some((task_id, cancel)) = unlocked else {
            return false;
        };
        log::warn!("force-released motion lock on task {task_id}");
        if let Some(pending) = state.pending.take() {
            cancel.request();
            state.slot = Some(pending);
        }
        drop(state);
        self.shared.wakeup.notify_one();
        true
    }

    /// Status snapshot.
    pub fn status(&self) -> ExecutorStatus {
        let state = self.shared.state.lock().unwrap();
        ExecutorStatus {
            running: state.running.as_ref().map(|r| RunningInfo {
                task_id: r.id,
                target: r.target,
                locked: r.locked.load(Ordering::SeqCst),
                elapsed: r.started.elapsed(),
            }),
            has_queued: state.slot.is_some(),
            has_pending: state.pending.is_some(),
            last_finished: state.last_finished,
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
            superseded: self.shared.superseded.load(Ordering::SeqCst),
            interrupted: self.shared.interrupted.load(Ordering::SeqCst),
            move_failures: self.shared.move_failures.load(Ordering::SeqCst),
            worker_faults: self.shared.worker_faults.load(Ordering::SeqCst),
        }
    }

    /// True while a task is executing.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().unwrap().running.is_some()
    }

    /// Stop the worker: cancels the running task (lock or no lock), discards
    /// queued and pending submissions, and joins the worker task.
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock().unwrap();
            state.slot = None;
            state.pending = None;
            if let Some(running) = &state.running {
                running.locked.store(false, Ordering::SeqCst);
                running.cancel.request();
            }
        }
        self.shared.wakeup.notify_one();

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("executor worker join failed: {e}");
            }
        }
    }
}

/// Outcome of waiting out an inter-step delay.
enum DelayOutcome {
    Elapsed,
    Cancelled,
    Interrupted,
}

async fn worker_loop(shared: Arc<ExecShared>) {
    loop {
        // Take the next submission, or park until one arrives.
        let (submission, cancel, locked_flag, task_id) = loop {
            if shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            {
                let mut state = shared.state.lock().unwrap();
                if let Some(submission) = state.slot.take() {
                    let id = state.next_id;
                    state.next_id += 1;
                    let cancel = Arc::new(CancelSignal::default());
                    let locked = Arc::new(AtomicBool::new(submission.locked));
                    state.running = Some(RunningTask {
                        id,
                        target: submission.plan.target,
                        locked: locked.clone(),
                        cancel: cancel.clone(),
                        started: Instant::now(),
                    });
                    break (submission, cancel, locked, id);
                }
            }
            shared.wakeup.notified().await;
        };

        log::debug!(
            "task {}: executing {} step(s) toward ({:.1}, {:.1}), locked={}",
            task_id,
            submission.plan.steps.len(),
            submission.plan.target.x,
            submission.plan.target.y,
            submission.locked
        );
        shared.callbacks.emit(&CoordinatorEvent::MotionStarted {
            task_id,
            target: submission.plan.target,
            locked: submission.locked,
        });

        // A panicking actuator must not kill the worker or leave the lock
        // held: catch at the task boundary, count, and keep draining.
        let run = run_plan(&shared, &submission.plan, &cancel, &locked_flag);
        let status = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(status) => status,
            Err(_) => {
                shared.worker_faults.fetch_add(1, Ordering::SeqCst);
                log::error!("task {task_id}: worker fault caught, releasing lock");
                TaskStatus::Interrupted
            }
        };

        match status {
            TaskStatus::Completed => shared.completed.fetch_add(1, Ordering::SeqCst),
            TaskStatus::Superseded => shared.superseded.fetch_add(1, Ordering::SeqCst),
            _ => shared.interrupted.fetch_add(1, Ordering::SeqCst),
        };

        {
            let mut state = shared.state.lock().unwrap();
            state.running = None;
            state.last_finished = Some((task_id, status));
            // Promote the staged submission now that the lock is gone. The
            // slot can already hold a newer submission (supersession after a
            // force-unlock); the newer one wins.
            if let Some(pending) = state.pending.take() {
                if state.slot.is_none() {
                    state.slot = Some(pending);
                }
            }
        }
        shared.wakeup.notify_one();

        log::debug!("task {task_id}: finished with {status:?}");
        shared
            .callbacks
            .emit(&CoordinatorEvent::MotionEnded { task_id, status });
    }
}

async fn run_plan(
    shared: &ExecShared,
    plan: &MotionPlan,
    cancel: &CancelSignal,
    locked: &AtomicBool,
) -> TaskStatus {
    let step_count = plan.steps.len();
    for (index, step) in plan.steps.iter().enumerate() {
        // Lock wins over interrupt: a locked task keeps going even with a
        // supersession flagged. The flag stays set, so it takes effect the
        // moment the lock is force-released.
        if cancel.is_requested() && !locked.load(Ordering::SeqCst) {
            return TaskStatus::Superseded;
        }
        if (shared.interrupt)() {
            log::debug!("interrupt predicate raised, skipping {} remaining step(s)",
                step_count - index);
            return TaskStatus::Completed;
        }

        // Jitter can leave a negligible residual step; don't bother the
        // actuator with it.
        if step.distance() < 0.1 {
            continue;
        }

        if let Err(e) = shared.actuator.pointer_move(step.delta.x, step.delta.y) {
            shared.move_failures.fetch_add(1, Ordering::SeqCst);
            log::warn!("step {}/{} failed: {e}", index + 1, step_count);
            return TaskStatus::Interrupted;
        }

        if index + 1 < step_count && !step.delay.is_zero() {
            match wait_step_delay(shared, step.delay, cancel, locked).await {
                DelayOutcome::Elapsed => {}
                DelayOutcome::Cancelled => return TaskStatus::Superseded,
                DelayOutcome::Interrupted => return TaskStatus::Completed,
            }
        }
    }
    // One more consult after the last step, so a pulse armed by the final
    // correction fires now instead of waiting for the next observation.
    let _ = (shared.interrupt)();
    TaskStatus::Completed
}

/// Wait out an inter-step delay while staying responsive to cancellation and
/// the interrupt predicate. The wait is chunked at the poll interval and
/// raced against the cancel notify, so neither signal waits for the full
/// delay and no cycle is burned spinning.
async fn wait_step_delay(
    shared: &ExecShared,
    delay: Duration,
    cancel: &CancelSignal,
    locked: &AtomicBool,
) -> DelayOutcome {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_requested() && !locked.load(Ordering::SeqCst) {
            return DelayOutcome::Cancelled;
        }
        if (shared.interrupt)() {
            return DelayOutcome::Interrupted;
        }
        let now = Instant::now();
        if now >= deadline {
            return DelayOutcome::Elapsed;
        }
        let chunk = (deadline - now).min(shared.poll_interval);
        tokio::select! {
            _ = cancel.notify.notified() => {}
            _ = tokio::time::sleep(chunk) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_actuator::MockActuator;
    use crate::planner::MotionStep;

    fn plan_with_delays(steps: &[(f64, f64)], delay: Duration) -> MotionPlan {
        let target = steps
            .iter()
            .fold(Vector2::zeros(), |acc, (x, y)| acc + Vector2::new(*x, *y));
        MotionPlan {
            steps: steps
                .iter()
                .map(|(x, y)| MotionStep {
                    delta: Vector2::new(*x, *y),
                    delay,
                })
                .collect(),
            target,
            distance: target.norm(),
            class: crate::planner::MotionClass::ExtraLarge,
        }
    }

    fn never_interrupt() -> InterruptPredicate {
        Arc::new(|| false)
    }

    async fn wait_idle(executor: &MotionExecutor) {
        for _ in 0..2000 {
            let status = executor.status();
            if status.running.is_none() && !status.has_queued && !status.has_pending {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("executor did not become idle");
    }

    #[tokio::test]
    async fn test_single_plan_runs_to_completion() {
        let actuator = Arc::new(MockActuator::new());
        let executor = MotionExecutor::spawn(
            actuator.clone(),
            never_interrupt(),
            Arc::new(CallbackRegistry::new()),
            Duration::from_millis(1),
        );

        let outcome = executor.submit(
            plan_with_delays(&[(10.0, 0.0), (5.0, 5.0)], Duration::ZERO),
            false,
        );
        assert_eq!(outcome, SubmitOutcome::Started);

        wait_idle(&executor).await;
        let status = executor.status();
        assert_eq!(status.completed, 1);
        assert_eq!(status.last_finished.unwrap().1, TaskStatus::Completed);
        assert_eq!(actuator.total_moved(), Vector2::new(15.0, 5.0));

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_move_failure_interrupts_task() {
        let actuator = Arc::new(MockActuator::new());
        actuator.set_fail_moves(true);
        let executor = MotionExecutor::spawn(
            actuator.clone(),
            never_interrupt(),
            Arc::new(CallbackRegistry::new()),
            Duration::from_millis(1),
        );

        executor.submit(plan_with_delays(&[(10.0, 0.0)], Duration::ZERO), false);
        wait_idle(&executor).await;

        let status = executor.status();
        assert_eq!(status.interrupted, 1);
        assert_eq!(status.move_failures, 1);
        assert_eq!(status.last_finished.unwrap().1, TaskStatus::Interrupted);

        // The worker survives and keeps draining.
        actuator.set_fail_moves(false);
        executor.submit(plan_with_delays(&[(1.0, 0.0)], Duration::ZERO), false);
        wait_idle(&executor).await;
        assert_eq!(executor.status().completed, 1);

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_interrupt_predicate_completes_early() {
        let actuator = Arc::new(MockActuator::new());
        let fire = Arc::new(AtomicBool::new(false));
        let fire_clone = fire.clone();
        let executor = MotionExecutor::spawn(
            actuator.clone(),
            Arc::new(move || fire_clone.load(Ordering::SeqCst)),
            Arc::new(CallbackRegistry::new()),
            Duration::from_millis(1),
        );

        executor.submit(
            plan_with_delays(
                &[(10.0, 0.0), (10.0, 0.0), (10.0, 0.0)],
                Duration::from_millis(50),
            ),
            false,
        );
        // Raise the predicate during the first inter-step delay.
        tokio::time::sleep(Duration::from_millis(10)).await;
        fire.store(true, Ordering::SeqCst);

        wait_idle(&executor).await;
        let status = executor.status();
        // Early stop is a completion, not an interruption.
        assert_eq!(status.last_finished.unwrap().1, TaskStatus::Completed);
        assert!(actuator.moves().len() < 3);

        executor.shutdown().await;
    }
}
