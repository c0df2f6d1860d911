//! Alignment evaluation and trigger discipline.
//!
//! Decides when the pointer is aligned with the target for real: single
//! observations arm nothing, a rolling window of them does. The engine walks
//! `NotAligned -> Aligned -> Armed -> Fired -> (cooldown) -> NotAligned`,
//! firing at most once per cooldown period. The cooldown is measured from
//! the last actual activation and is never reset by a mere alignment
//! observation; being aligned while cooling is its own reportable condition.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::{AlignmentConfig, ThresholdMode};
use crate::error::ActuationError;
use crate::frame::TargetOffset;
use crate::timestamp::Timestamp;

/// One alignment observation in the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentSample {
    /// When the observation was made.
    pub at: Timestamp,
    /// Whether the offset passed the fine tolerance.
    pub aligned: bool,
}

/// Observable phase of the trigger state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentPhase {
    /// Activation decisions are disabled.
    Disabled,
    /// The latest observation missed the fine tolerance.
    NotAligned,
    /// Aligned, but the window has not accumulated enough samples yet.
    Aligned,
    /// Enough aligned samples in the window; ready to fire.
    Armed,
    /// Aligned (or armed) but the cooldown from the last pulse is running.
    OnCooldown,
}

/// Result of a [`check_and_fire`](AlignmentEngine::check_and_fire) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The pulse was issued and accepted.
    Fired,
    /// The pulse was issued and rejected; the cooldown commits anyway.
    FiredWithError,
    /// Not enough aligned samples inside the window.
    NotArmed,
    /// The cooldown from the previous pulse has not expired.
    OnCooldown,
    /// The engine is disabled.
    Disabled,
}

/// Status snapshot of the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentSnapshot {
    /// Current phase.
    pub phase: AlignmentPhase,
    /// Aligned samples currently inside the window.
    pub aligned_in_window: usize,
    /// Remaining cooldown, zero when expired.
    pub cooldown_remaining: Duration,
    /// Pulses fired over the engine's lifetime.
    pub fire_count: u64,
    /// Pulses the actuator rejected.
    pub activation_failures: u64,
}

/// Hysteresis/cooldown state machine gating the activation pulse.
///
/// The threshold mode (angle vs. pixel) is fixed at construction and never
/// switched per call. All methods take explicit timestamps, so the machine
/// can be driven through arbitrary schedules in tests.
#[derive(Debug)]
pub struct AlignmentEngine {
    config: AlignmentConfig,
    samples: VecDeque<AlignmentSample>,
    last_fire: Option<Timestamp>,
    last_aligned: bool,
    fire_count: u64,
    activation_failures: u64,
}

impl AlignmentEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
            last_fire: None,
            last_aligned: false,
            fire_count: 0,
            activation_failures: 0,
        }
    }

    /// The configuration this engine runs under.
    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Enable or disable activation decisions.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.samples.clear();
            self.last_aligned = false;
        }
        log::info!(
            "activation decisions {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Whether activation decisions are enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Pure threshold check against the fine tolerance.
    ///
    /// Angle mode compares the angular offset magnitude. Pixel mode requires
    /// both the scalar distance under the fine tolerance and each axis under
    /// the per-axis tolerance.
    pub fn evaluate(&self, offset: &TargetOffset) -> bool {
        match self.config.mode {
            ThresholdMode::Angle => offset.angle_distance() <= self.config.fine_angle_deg,
            ThresholdMode::Pixel => {
                offset.pixel_distance() <= self.config.fine_pixel
                    && offset.pixel.x.abs() <= self.config.axis_pixel
                    && offset.pixel.y.abs() <= self.config.axis_pixel
            }
        }
    }

    /// Check against the coarse ("near") tolerance, for diagnostics.
    pub fn evaluate_coarse(&self, offset: &TargetOffset) -> bool {
        match self.config.mode {
            ThresholdMode::Angle => offset.angle_distance() <= self.config.coarse_angle_deg,
            ThresholdMode::Pixel => offset.pixel_distance() <= self.config.coarse_pixel,
        }
    }

    /// Record an observation and prune samples that aged out of the window.
    ///
    /// Misaligned observations do not clear earlier aligned samples, so brief
    /// detection dropouts inside the window are tolerated.
    pub fn record_observation(&mut self, aligned: bool, at: Timestamp) {
        self.last_aligned = aligned;
        self.samples.push_back(AlignmentSample { at, aligned });
        self.prune(at);
    }

    /// Convenience: evaluate and record in one call, returning the verdict.
    pub fn observe(&mut self, offset: &TargetOffset, at: Timestamp) -> bool {
        let aligned = self.evaluate(offset);
        self.record_observation(aligned, at);
        aligned
    }

    /// Clear the alignment state (called when the target disappears).
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_aligned = false;
    }

    /// Aligned samples currently inside the window ending at `now`.
    pub fn aligned_in_window(&self, now: Timestamp) -> usize {
        self.samples
            .iter()
            .filter(|s| s.aligned && now.saturating_since(s.at) <= self.config.window)
            .count()
    }

    /// True while the cooldown from the last pulse is running.
    pub fn on_cooldown(&self, now: Timestamp) -> bool {
        !self.cooldown_remaining(now).is_zero()
    }

    /// Remaining cooldown at `now`, zero when expired.
    pub fn cooldown_remaining(&self, now: Timestamp) -> Duration {
        match self.last_fire {
            Some(fired) => self
                .config
                .cooldown
                .saturating_sub(now.saturating_since(fired)),
            None => Duration::ZERO,
        }
    }

    /// Enough aligned samples and off cooldown: the next
    /// [`check_and_fire`](Self::check_and_fire) will pulse.
    pub fn fire_pending(&self, now: Timestamp) -> bool {
        self.config.enabled
            && !self.on_cooldown(now)
            && self.aligned_in_window(now) >= self.config.required_samples
    }

    /// Fire the activation closure if armed and off cooldown.
    ///
    /// On invocation the sample window is cleared and the cooldown starts
    /// from `now` regardless of whether the pulse succeeded; a rejected pulse
    /// is counted but does not re-arm early, so a failing backend is not
    /// hammered at observation rate.
    pub fn check_and_fire<F>(&mut self, now: Timestamp, fire: F) -> FireOutcome
    where
        F: FnOnce() -> Result<(), ActuationError>,
    {
        if !self.config.enabled {
            return FireOutcome::Disabled;
        }
        if self.on_cooldown(now) {
            return FireOutcome::OnCooldown;
        }
        if self.aligned_in_window(now) < self.config.required_samples {
            return FireOutcome::NotArmed;
        }

        self.samples.clear();
        self.last_fire = Some(now);
        self.fire_count += 1;

        match fire() {
            Ok(()) => {
                log::info!("activation pulse fired at {now}");
                FireOutcome::Fired
            }
            Err(e) => {
                self.activation_failures += 1;
                log::warn!("activation pulse failed at {now}: {e}");
                FireOutcome::FiredWithError
            }
        }
    }

    /// Status snapshot at `now`.
    pub fn snapshot(&self, now: Timestamp) -> AlignmentSnapshot {
        let aligned_in_window = self.aligned_in_window(now);
        let cooldown_remaining = self.cooldown_remaining(now);
        let phase = if !self.config.enabled {
            AlignmentPhase::Disabled
        } else if !cooldown_remaining.is_zero() {
            if self.last_aligned {
                AlignmentPhase::OnCooldown
            } else {
                AlignmentPhase::NotAligned
            }
        } else if aligned_in_window >= self.config.required_samples {
            AlignmentPhase::Armed
        } else if self.last_aligned {
            AlignmentPhase::Aligned
        } else {
            AlignmentPhase::NotAligned
        };

        AlignmentSnapshot {
            phase,
            aligned_in_window,
            cooldown_remaining,
            fire_count: self.fire_count,
            activation_failures: self.activation_failures,
        }
    }

    fn prune(&mut self, now: Timestamp) {
        let window = self.config.window;
        while let Some(front) = self.samples.front() {
            if now.saturating_since(front.at) > window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
