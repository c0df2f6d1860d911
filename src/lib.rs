//! Reticle - pointer alignment and actuation control core.
//!
//! Converts a perceived 2D target position into relative pointer-actuation
//! commands and decides, with strict timing discipline, when to issue a
//! discrete activation pulse once the pointer is judged aligned.
//!
//! Data flow: a detector hands the coordinator a target observation; the
//! [`CoordinateFrame`] expresses the offset in pixel, normalized, and angular
//! space; the [`MotionPlanner`] decomposes the pixel offset into an
//! exactly-summing step sequence; the [`MotionExecutor`] runs it
//! asynchronously with cooperative cancellation; the [`AlignmentEngine`] is
//! consulted on every observation and, once armed and off cooldown, fires the
//! activation pulse through the [`Actuator`].
//!
//! Everything is explicitly constructed and owned by the
//! [`MovementCoordinator`]; there is no process-wide instance, so independent
//! coordinators can coexist (and be tested) freely.

use std::sync::{Arc, Mutex};

use nalgebra::Vector2;

pub mod actuator;
pub mod alignment;
pub mod callback;
pub mod config;
pub mod error;
pub mod executor;
pub mod frame;
pub mod mock_actuator;
pub mod planner;
pub mod timestamp;

pub use crate::actuator::{ActivationButton, Actuator};
pub use crate::alignment::{AlignmentEngine, AlignmentPhase, AlignmentSnapshot, FireOutcome};
pub use crate::callback::{CallbackId, CallbackRegistry, CoordinatorEvent};
pub use crate::config::{
    AlignmentConfig, CoordinatorConfig, DecayProfile, FrameConfig, PlannerConfig, ThresholdMode,
};
pub use crate::error::{ActuationError, ConfigError};
pub use crate::executor::{
    ExecutorStatus, InterruptPredicate, MotionExecutor, SubmitOutcome, TaskStatus,
};
pub use crate::frame::{CoordinateFrame, TargetOffset};
pub use crate::mock_actuator::MockActuator;
pub use crate::planner::{MotionClass, MotionPlan, MotionPlanner, MotionStep};
pub use crate::timestamp::{SessionClock, Timestamp};

/// One candidate target as delivered by the detection collaborator.
///
/// The core consumes only the pixel center and bounding size; confidence is
/// carried through for callers that log or filter on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetObservation {
    /// Target center in capture pixels.
    pub center: Vector2<f64>,
    /// Bounding box size in capture pixels (width, height).
    pub size: Vector2<f64>,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
}

/// What the coordinator did with one target observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The alignment engine fired (or attempted) the activation pulse.
    Activated(FireOutcome),
    /// The offset was inside the settle radius; no motion submitted.
    Settled,
    /// A motion plan was submitted to the executor.
    Submitted(SubmitOutcome),
}

/// Combined status of the executor and the alignment engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    /// A motion task is currently executing.
    pub task_running: bool,
    /// Phase of the trigger state machine.
    pub phase: AlignmentPhase,
    /// Enough aligned observations are in the window to fire.
    pub armed: bool,
    /// The activation cooldown is running.
    pub on_cooldown: bool,
    /// Remaining cooldown, zero when expired.
    pub cooldown_remaining: std::time::Duration,
    /// Activation pulses fired so far.
    pub fire_count: u64,
    /// Activation pulses the actuator rejected.
    pub activation_failures: u64,
    /// Executor detail: task counts, failures, pending flags.
    pub executor: ExecutorStatus,
}

/// Facade owning the frame, planner, executor, and alignment engine.
pub struct MovementCoordinator {
    frame: CoordinateFrame,
    planner: Mutex<MotionPlanner>,
    alignment: Arc<Mutex<AlignmentEngine>>,
    executor: MotionExecutor,
    actuator: Arc<dyn Actuator>,
    callbacks: Arc<CallbackRegistry>,
    clock: SessionClock,
    anchor_bias: f64,
    settle_radius: f64,
    activation_button: ActivationButton,
}

impl MovementCoordinator {
    /// Validate the configuration and spawn the motion worker.
    ///
    /// Must be called within a tokio runtime; the executor's worker task is
    /// spawned here.
    pub fn new(
        config: CoordinatorConfig,
        actuator: Arc<dyn Actuator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let frame = CoordinateFrame::new(config.frame)?;
        let planner = Mutex::new(MotionPlanner::new(config.planner.clone()));
        let alignment = Arc::new(Mutex::new(AlignmentEngine::new(config.alignment.clone())));
        let callbacks = Arc::new(CallbackRegistry::new());
        let clock = SessionClock::start();

        // The executor consults the alignment engine between and within
        // steps: once armed and off cooldown, the pulse fires from the
        // worker and the remaining steps are skipped as a completion, not a
        // failure.
        let interrupt: InterruptPredicate = {
            let alignment = alignment.clone();
            let clock = clock.clone();
            let actuator = actuator.clone();
            let callbacks = callbacks.clone();
            let button = config.activation_button;
            Arc::new(move || {
                try_fire(&alignment, actuator.as_ref(), &callbacks, button, clock.now())
                    .is_some()
            })
        };

        let executor = MotionExecutor::spawn(
            actuator.clone(),
            interrupt,
            callbacks.clone(),
            config.poll_interval,
        );

        let (eff_h, eff_v) = frame.effective_fov();
        log::info!(
            "coordinator ready: capture {}px, effective FOV {:.2}x{:.2} deg",
            config.frame.capture_size,
            eff_h,
            eff_v
        );

        Ok(Self {
            frame,
            planner,
            alignment,
            executor,
            actuator,
            callbacks,
            clock,
            anchor_bias: config.anchor_bias,
            settle_radius: config.settle_radius,
            activation_button: config.activation_button,
        })
    }

    /// Handle a target observation with a normal (supersedable) motion.
    pub fn process_target(&self, observation: &TargetObservation) -> ProcessOutcome {
        self.handle(observation, false)
    }

    /// Handle a target observation with a locked motion: the resulting task
    /// cannot be superseded until it completes; newer submissions wait in the
    /// pending slot.
    pub fn process_target_locked(&self, observation: &TargetObservation) -> ProcessOutcome {
        self.handle(observation, true)
    }

    fn handle(&self, observation: &TargetObservation, locked: bool) -> ProcessOutcome {
        let now = self.clock.now();

        // Anchor the aim point within the bounding box: a configurable
        // fraction of the box height above its center.
        let aim = Vector2::new(
            observation.center.x,
            observation.center.y - observation.size.y * self.anchor_bias,
        );
        let offset = self.frame.compose_offset(aim, self.frame.center_point());

        self.alignment.lock().unwrap().observe(&offset, now);

        // While a task is executing, firing belongs to the worker's
        // per-step check so the remaining steps are pre-empted along with
        // the pulse. From an idle state, fire directly.
        if !self.executor.is_running() {
            if let Some(outcome) = try_fire(
                &self.alignment,
                self.actuator.as_ref(),
                &self.callbacks,
                self.activation_button,
                now,
            ) {
                return ProcessOutcome::Activated(outcome);
            }
        }

        if offset.pixel_distance() <= self.settle_radius {
            log::debug!(
                "offset {:.1}px inside settle radius, holding position",
                offset.pixel_distance()
            );
            return ProcessOutcome::Settled;
        }

        let plan = self.planner.lock().unwrap().plan(offset.pixel);
        ProcessOutcome::Submitted(self.executor.submit(plan, locked))
    }

    /// Tell the coordinator the target disappeared; clears alignment state
    /// (the cooldown is unaffected).
    pub fn target_lost(&self) {
        self.alignment.lock().unwrap().reset();
    }

    /// Enable or disable activation decisions at runtime.
    pub fn set_activation_enabled(&self, enabled: bool) {
        self.alignment.lock().unwrap().set_enabled(enabled);
    }

    /// Combined status snapshot.
    pub fn status(&self) -> CoordinatorStatus {
        let now = self.clock.now();
        let snapshot = self.alignment.lock().unwrap().snapshot(now);
        let executor = self.executor.status();
        CoordinatorStatus {
            task_running: executor.running.is_some(),
            phase: snapshot.phase,
            armed: snapshot.phase == AlignmentPhase::Armed,
            on_cooldown: !snapshot.cooldown_remaining.is_zero(),
            cooldown_remaining: snapshot.cooldown_remaining,
            fire_count: snapshot.fire_count,
            activation_failures: snapshot.activation_failures,
            executor,
        }
    }

    /// The coordinate frame in use.
    pub fn frame(&self) -> &CoordinateFrame {
        &self.frame
    }

    /// Register an event callback; see [`CoordinatorEvent`].
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&CoordinatorEvent) + Send + Sync + 'static,
    {
        self.callbacks.register(callback)
    }

    /// Deregister a previously registered callback.
    pub fn deregister_callback(&self, id: CallbackId) -> bool {
        self.callbacks.deregister(id)
    }

    /// Force-release the lock on a running motion task.
    pub fn force_unlock(&self) -> bool {
        self.executor.force_unlock()
    }

    /// Stop the motion worker and wait for it to exit.
    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}

/// Fire the activation pulse if the engine is armed and off cooldown.
///
/// Pointer input is suppressed around the pulse via the paused/resumed
/// callbacks so the collaborator holding the physical device stays quiet
/// while the press goes out. Returns `None` when the conditions were not
/// met; the engine re-checks them under its own lock, so concurrent callers
/// cannot double-fire.
fn try_fire(
    alignment: &Mutex<AlignmentEngine>,
    actuator: &dyn Actuator,
    callbacks: &CallbackRegistry,
    button: ActivationButton,
    now: Timestamp,
) -> Option<FireOutcome> {
    if !alignment.lock().ok()?.fire_pending(now) {
        return None;
    }

    // No lock is held while callbacks run; check_and_fire re-validates the
    // conditions under the engine lock, so a concurrent racer simply sees
    // the cooldown and backs off.
    callbacks.emit(&CoordinatorEvent::MovementPaused);
    let outcome = alignment
        .lock()
        .ok()?
        .check_and_fire(now, || actuator.activate(button));

    let fired = matches!(
        outcome,
        FireOutcome::Fired | FireOutcome::FiredWithError
    );
    if fired {
        callbacks.emit(&CoordinatorEvent::Activated {
            at: now,
            succeeded: outcome == FireOutcome::Fired,
        });
    }
    callbacks.emit(&CoordinatorEvent::MovementResumed);

    fired.then_some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> CoordinatorConfig {
        CoordinatorConfig {
            planner: PlannerConfig {
                base_step_delay: std::time::Duration::ZERO,
                ..PlannerConfig::default()
            },
            ..CoordinatorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_construction_rejects_bad_config() {
        let actuator = Arc::new(MockActuator::new());
        let config = CoordinatorConfig {
            anchor_bias: 1.5,
            ..CoordinatorConfig::default()
        };
        assert!(matches!(
            MovementCoordinator::new(config, actuator),
            Err(ConfigError::RatioOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_settled_inside_radius() {
        let actuator = Arc::new(MockActuator::new());
        let coordinator = MovementCoordinator::new(quiet_config(), actuator).unwrap();

        // Aim point exactly at center once the anchor bias is compensated.
        let center = coordinator.frame().center_point();
        let observation = TargetObservation {
            center: Vector2::new(center.x, center.y + 10.0 * 0.38),
            size: Vector2::new(10.0, 10.0),
            confidence: 0.9,
        };
        // First observations arm the trigger instead of settling, so disable
        // activation to watch the motion path alone.
        coordinator.set_activation_enabled(false);
        assert_eq!(
            coordinator.process_target(&observation),
            ProcessOutcome::Settled
        );

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let actuator = Arc::new(MockActuator::new());
        let coordinator = MovementCoordinator::new(quiet_config(), actuator).unwrap();
        let status = coordinator.status();
        assert!(!status.task_running);
        assert!(!status.armed);
        assert!(!status.on_cooldown);
        assert_eq!(status.fire_count, 0);
        coordinator.shutdown().await;
    }
}
