//! Configuration for the motion and trigger core.
//!
//! One immutable [`CoordinatorConfig`] is supplied at construction. Every
//! numeric breakpoint that shapes behavior (distance bands, step ratios,
//! tolerances, timing) lives here rather than as a constant buried in an
//! algorithm, and is validated up front. The defaults reproduce the tuning
//! the system shipped with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actuator::ActivationButton;
use crate::error::ConfigError;

/// Geometry of the capture region relative to the display it watches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Side length of the square capture region, in pixels.
    pub capture_size: u32,
    /// Display width in pixels.
    pub display_width: u32,
    /// Display height in pixels.
    pub display_height: u32,
    /// Horizontal field of view covered by the full display, in degrees.
    pub fov_horizontal_deg: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            capture_size: 320,
            display_width: 2560,
            display_height: 1600,
            fov_horizontal_deg: 103.0,
        }
    }
}

impl FrameConfig {
    /// Validate geometry; fails fast on out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_size == 0 {
            return Err(ConfigError::ZeroDimension {
                name: "capture_size",
            });
        }
        if self.display_width == 0 {
            return Err(ConfigError::ZeroDimension {
                name: "display_width",
            });
        }
        if self.display_height == 0 {
            return Err(ConfigError::ZeroDimension {
                name: "display_height",
            });
        }
        if !(self.fov_horizontal_deg > 0.0 && self.fov_horizontal_deg < 180.0) {
            return Err(ConfigError::FovOutOfRange(self.fov_horizontal_deg));
        }
        let min_extent = self.display_width.min(self.display_height);
        if self.capture_size > min_extent {
            return Err(ConfigError::CaptureExceedsDisplay {
                capture: self.capture_size,
                display: min_extent,
            });
        }
        Ok(())
    }
}

/// Named decay policy controlling how humanized step distances shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayProfile {
    /// Steep front-load; first step carries roughly three quarters.
    Aggressive,
    /// Moderate front-load (default).
    #[default]
    Balanced,
    /// Shallow front-load.
    Gentle,
    /// Linearly decreasing step distances.
    Linear,
}

impl DecayProfile {
    /// Exponential decay factor; zero selects the linear ramp.
    pub fn decay_factor(&self) -> f64 {
        match self {
            DecayProfile::Aggressive => 1.5,
            DecayProfile::Balanced => 1.2,
            DecayProfile::Gentle => 0.9,
            DecayProfile::Linear => 0.0,
        }
    }

    /// Normalized front-loaded ratio sequence for `count` steps.
    pub fn ratios(&self, count: usize) -> Vec<f64> {
        if count == 0 {
            return Vec::new();
        }
        let factor = self.decay_factor();
        let raw: Vec<f64> = if factor == 0.0 {
            (0..count).map(|i| (count - i) as f64).collect()
        } else {
            (0..count).map(|i| (-factor * i as f64).exp()).collect()
        };
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|r| r / total).collect()
    }
}

/// Parameters of the motion planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Distances at or below this move in a single step.
    pub micro_threshold: f64,
    /// Upper bound of the two-step medium band.
    pub medium_threshold: f64,
    /// Upper bound of the coarse/fine large band.
    pub large_threshold: f64,
    /// Upper bound of the humanized band; beyond it the eased classic
    /// decomposition applies.
    pub humanized_ceiling: f64,

    /// Fraction of the displacement taken by the first medium-band step.
    pub medium_first_ratio: f64,
    /// Fraction of the displacement taken by the first large-band step.
    pub large_first_ratio: f64,
    /// Remaining distance below this is finished in one step instead of
    /// interpolated fine steps.
    pub final_precision_threshold: f64,
    /// Distance covered per interpolated fine step.
    pub fine_step_distance: f64,
    /// Minimum number of fine steps.
    pub min_fine_steps: usize,
    /// Maximum number of fine steps.
    pub max_fine_steps: usize,

    /// Decay profile for the humanized band.
    pub decay_profile: DecayProfile,
    /// Lower bound on the targeted final step, in units.
    pub min_final_step: f64,
    /// Upper bound on the targeted final step, in units. Must stay below the
    /// overshoot cap the alignment tolerances assume.
    pub max_final_step: f64,
    /// Floor on the second-to-last step, in units, preserving room for a last
    /// correction.
    pub min_penultimate_step: f64,

    /// Enable isotropic jitter on non-terminal steps.
    pub jitter_enabled: bool,
    /// Peak jitter amplitude in units; tapers toward zero near the end.
    pub jitter_intensity: f64,
    /// Enable the perpendicular arc offset on intermediate waypoints.
    pub arc_enabled: bool,
    /// Arc height as a fraction of total distance.
    pub arc_height_factor: f64,

    /// Base inter-step delay; zero disables all delay handling.
    pub base_step_delay: Duration,
    /// Symmetric random variance applied to each non-zero delay.
    pub step_delay_variance: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            micro_threshold: 15.0,
            medium_threshold: 60.0,
            large_threshold: 120.0,
            humanized_ceiling: 300.0,
            medium_first_ratio: 0.60,
            large_first_ratio: 0.80,
            final_precision_threshold: 3.0,
            fine_step_distance: 20.0,
            min_fine_steps: 2,
            max_fine_steps: 3,
            decay_profile: DecayProfile::Balanced,
            min_final_step: 8.0,
            max_final_step: 18.0,
            min_penultimate_step: 20.0,
            jitter_enabled: true,
            jitter_intensity: 1.5,
            arc_enabled: true,
            arc_height_factor: 0.08,
            base_step_delay: Duration::from_millis(3),
            step_delay_variance: Duration::from_millis(2),
        }
    }
}

impl PlannerConfig {
    /// Validate band ordering, ratios, and step bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.micro_threshold > 0.0
            && self.micro_threshold < self.medium_threshold
            && self.medium_threshold < self.large_threshold
            && self.large_threshold < self.humanized_ceiling)
        {
            return Err(ConfigError::ThresholdOrder {
                micro: self.micro_threshold,
                medium: self.medium_threshold,
                large: self.large_threshold,
                ceiling: self.humanized_ceiling,
            });
        }
        for (name, value) in [
            ("medium_first_ratio", self.medium_first_ratio),
            ("large_first_ratio", self.large_first_ratio),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::RatioOutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("final_precision_threshold", self.final_precision_threshold),
            ("fine_step_distance", self.fine_step_distance),
            ("min_final_step", self.min_final_step),
            ("min_penultimate_step", self.min_penultimate_step),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.min_final_step > self.max_final_step {
            return Err(ConfigError::FinalStepBounds {
                min: self.min_final_step,
                max: self.max_final_step,
            });
        }
        if self.min_fine_steps < 1 || self.min_fine_steps > self.max_fine_steps {
            return Err(ConfigError::FineStepRange {
                min: self.min_fine_steps,
                max: self.max_fine_steps,
            });
        }
        if self.arc_height_factor < 0.0 {
            return Err(ConfigError::NonPositive {
                name: "arc_height_factor",
                value: self.arc_height_factor,
            });
        }
        if self.jitter_intensity < 0.0 {
            return Err(ConfigError::NonPositive {
                name: "jitter_intensity",
                value: self.jitter_intensity,
            });
        }
        Ok(())
    }
}

/// Which offset representation alignment thresholds compare against.
///
/// A construction-time choice; the engine never switches modes per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Compare the angular offset magnitude (preferred).
    #[default]
    Angle,
    /// Compare pixel distance plus independent per-axis checks.
    Pixel,
}

/// Parameters of the alignment/trigger engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Master enable for activation decisions.
    pub enabled: bool,
    /// Offset representation used for threshold checks.
    pub mode: ThresholdMode,

    /// Fine angular tolerance, degrees.
    pub fine_angle_deg: f64,
    /// Coarse angular tolerance, degrees; reported as "near" in status.
    pub coarse_angle_deg: f64,
    /// Fine pixel-distance tolerance.
    pub fine_pixel: f64,
    /// Coarse pixel-distance tolerance; reported as "near" in status.
    pub coarse_pixel: f64,
    /// Per-axis pixel tolerance; both axes must pass in pixel mode.
    pub axis_pixel: f64,

    /// Aligned observations required inside the window before arming.
    pub required_samples: usize,
    /// Width of the rolling observation window.
    pub window: Duration,
    /// Minimum interval between two activation pulses.
    pub cooldown: Duration,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ThresholdMode::Angle,
            fine_angle_deg: 0.3,
            coarse_angle_deg: 0.5,
            fine_pixel: 35.0,
            coarse_pixel: 45.0,
            axis_pixel: 35.0,
            required_samples: 2,
            window: Duration::from_millis(500),
            cooldown: Duration::from_millis(300),
        }
    }
}

impl AlignmentConfig {
    /// Validate tolerances and timing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("fine_angle_deg", self.fine_angle_deg),
            ("coarse_angle_deg", self.coarse_angle_deg),
            ("fine_pixel", self.fine_pixel),
            ("coarse_pixel", self.coarse_pixel),
            ("axis_pixel", self.axis_pixel),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.required_samples == 0 {
            return Err(ConfigError::ZeroRequiredSamples);
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "window" });
        }
        if self.cooldown.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "cooldown" });
        }
        Ok(())
    }
}

/// Top-level configuration for [`MovementCoordinator`](crate::MovementCoordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Capture/display geometry.
    pub frame: FrameConfig,
    /// Motion planner parameters.
    pub planner: PlannerConfig,
    /// Alignment engine parameters.
    pub alignment: AlignmentConfig,

    /// Vertical aim anchor as a fraction of the target box height above its
    /// center.
    pub anchor_bias: f64,
    /// Offsets below this pixel distance skip motion submission entirely.
    pub settle_radius: f64,
    /// Granularity of interrupt-predicate polling inside the executor.
    pub poll_interval: Duration,
    /// Control pressed by the activation pulse.
    pub activation_button: ActivationButton,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            planner: PlannerConfig::default(),
            alignment: AlignmentConfig::default(),
            anchor_bias: 0.38,
            settle_radius: 5.0,
            poll_interval: Duration::from_millis(1),
            activation_button: ActivationButton::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Validate the whole configuration tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame.validate()?;
        self.planner.validate()?;
        self.alignment.validate()?;
        if !(0.0..=1.0).contains(&self.anchor_bias) {
            return Err(ConfigError::RatioOutOfRange {
                name: "anchor_bias",
                value: self.anchor_bias,
            });
        }
        if self.settle_radius < 0.0 {
            return Err(ConfigError::NonPositive {
                name: "settle_radius",
                value: self.settle_radius,
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                name: "poll_interval",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_validate() {
        CoordinatorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_frame_rejects_zero_capture() {
        let config = FrameConfig {
            capture_size: 0,
            ..FrameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn test_frame_rejects_wild_fov() {
        for fov in [0.0, -10.0, 180.0, 200.0] {
            let config = FrameConfig {
                fov_horizontal_deg: fov,
                ..FrameConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::FovOutOfRange(_))
            ));
        }
    }

    #[test]
    fn test_frame_rejects_capture_larger_than_display() {
        let config = FrameConfig {
            capture_size: 2000,
            display_width: 2560,
            display_height: 1600,
            ..FrameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CaptureExceedsDisplay { .. })
        ));
    }

    #[test]
    fn test_planner_rejects_unordered_bands() {
        let config = PlannerConfig {
            medium_threshold: 10.0,
            ..PlannerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn test_planner_rejects_bad_ratio() {
        let config = PlannerConfig {
            large_first_ratio: 1.0,
            ..PlannerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RatioOutOfRange { .. })
        ));
    }

    #[test]
    fn test_planner_rejects_inverted_final_bounds() {
        let config = PlannerConfig {
            min_final_step: 20.0,
            max_final_step: 10.0,
            ..PlannerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FinalStepBounds { .. })
        ));
    }

    #[test]
    fn test_alignment_rejects_zero_samples() {
        let config = AlignmentConfig {
            required_samples: 0,
            ..AlignmentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroRequiredSamples)
        ));
    }

    #[test]
    fn test_alignment_rejects_zero_cooldown() {
        let config = AlignmentConfig {
            cooldown: Duration::ZERO,
            ..AlignmentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration { name: "cooldown" })
        ));
    }

    #[test]
    fn test_decay_ratios_sum_to_one() {
        for profile in [
            DecayProfile::Aggressive,
            DecayProfile::Balanced,
            DecayProfile::Gentle,
            DecayProfile::Linear,
        ] {
            for count in 1..=6 {
                let ratios = profile.ratios(count);
                assert_eq!(ratios.len(), count);
                let sum: f64 = ratios.iter().sum();
                assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_decay_ratios_front_loaded() {
        // The balanced profile lands its first step around 70% over five steps.
        let ratios = DecayProfile::Balanced.ratios(5);
        assert!(ratios[0] > 0.65 && ratios[0] < 0.75, "got {}", ratios[0]);
        for pair in ratios.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_linear_ratios_decrease_evenly() {
        let ratios = DecayProfile::Linear.ratios(5);
        assert_relative_eq!(ratios[0], 5.0 / 15.0, epsilon = 1e-12);
        assert_relative_eq!(ratios[4], 1.0 / 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = CoordinatorConfig::default();
        let json = serde_json::to_string(&original).unwrap();
        let recovered: CoordinatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(original, recovered);
    }
}
