//! Displacement decomposition.
//!
//! Turns a raw 2D displacement into an ordered sequence of incremental steps.
//! Band selection by magnitude picks one of four strategies: a single micro
//! step, a two-step medium split, a coarse-plus-fine large split, a humanized
//! front-loaded sequence with optional arc and jitter, or an eased classic
//! decomposition beyond the humanized ceiling.
//!
//! Every band obeys one correctness rule: the last step is computed as
//! `target - accumulated`, never as a fixed ratio, so the vector sum of a
//! plan's steps equals the requested displacement exactly no matter what
//! perturbation was applied earlier. Jitter and arc offsets are applied to
//! intermediate waypoints and therefore cancel in the differential.

use std::time::Duration;

use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PlannerConfig;

/// Magnitude classification of a displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionClass {
    /// At or below the micro threshold; moved in one step.
    Micro,
    /// At or below the medium threshold; two-step split.
    Medium,
    /// At or below the large threshold; coarse step plus fine interpolation.
    Large,
    /// Beyond the large threshold; humanized or eased decomposition.
    ExtraLarge,
}

/// One incremental move plus the delay to wait before the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStep {
    /// Relative pointer delta in actuation units.
    pub delta: Vector2<f64>,
    /// Pause after this step; zero on the last step and on delay-free plans.
    pub delay: Duration,
}

impl MotionStep {
    /// Scalar length of this step.
    pub fn distance(&self) -> f64 {
        self.delta.norm()
    }
}

/// An ordered, exactly-summing sequence of steps for one displacement.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPlan {
    /// Steps in execution order.
    pub steps: Vec<MotionStep>,
    /// The displacement this plan realizes.
    pub target: Vector2<f64>,
    /// Scalar length of the displacement.
    pub distance: f64,
    /// Magnitude class the displacement fell into.
    pub class: MotionClass,
}

impl MotionPlan {
    /// Vector sum of all step deltas.
    pub fn step_sum(&self) -> Vector2<f64> {
        self.steps
            .iter()
            .fold(Vector2::zeros(), |acc, s| acc + s.delta)
    }
}

/// Turns displacements into [`MotionPlan`]s under a fixed configuration.
///
/// Owns its RNG so jitter and delay variance are reproducible under
/// [`with_seed`](Self::with_seed).
pub struct MotionPlanner {
    config: PlannerConfig,
    rng: StdRng,
}

impl MotionPlanner {
    /// Planner with entropy-seeded randomness.
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Planner with deterministic randomness for tests and tooling.
    pub fn with_seed(config: PlannerConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The configuration this planner runs under.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Classify a distance against the configured band thresholds.
    pub fn classify(&self, distance: f64) -> MotionClass {
        if distance <= self.config.micro_threshold {
            MotionClass::Micro
        } else if distance <= self.config.medium_threshold {
            MotionClass::Medium
        } else if distance <= self.config.large_threshold {
            MotionClass::Large
        } else {
            MotionClass::ExtraLarge
        }
    }

    /// Decompose a displacement into a plan.
    pub fn plan(&mut self, target: Vector2<f64>) -> MotionPlan {
        let distance = target.norm();
        let class = self.classify(distance);

        let deltas = match class {
            MotionClass::Micro => vec![target],
            MotionClass::Medium => self.medium_steps(target),
            MotionClass::Large => self.large_steps(target),
            MotionClass::ExtraLarge => {
                if distance <= self.config.humanized_ceiling {
                    self.humanized_steps(target, distance)
                } else {
                    self.eased_steps(target, distance)
                }
            }
        };

        let count = deltas.len();
        let steps = deltas
            .into_iter()
            .enumerate()
            .map(|(i, delta)| MotionStep {
                delta,
                delay: self.step_delay(i, count),
            })
            .collect();

        MotionPlan {
            steps,
            target,
            distance,
            class,
        }
    }

    /// Two-step split: a coarse fraction, then the exact remainder.
    fn medium_steps(&self, target: Vector2<f64>) -> Vec<Vector2<f64>> {
        let first = target * self.config.medium_first_ratio;
        vec![first, target - first]
    }

    /// Coarse fraction, then the remainder interpolated into fine steps.
    fn large_steps(&self, target: Vector2<f64>) -> Vec<Vector2<f64>> {
        let first = target * self.config.large_first_ratio;
        let remaining = target - first;
        let remaining_distance = remaining.norm();

        let mut steps = vec![first];

        if remaining_distance > self.config.final_precision_threshold {
            let count = ((remaining_distance / self.config.fine_step_distance) as usize)
                .clamp(self.config.min_fine_steps, self.config.max_fine_steps);

            let mut accumulated = Vector2::zeros();
            for i in 0..count {
                if i + 1 == count {
                    steps.push(remaining - accumulated);
                } else {
                    let progress = (i + 1) as f64 / count as f64;
                    let waypoint = remaining * progress;
                    steps.push(waypoint - accumulated);
                    accumulated = waypoint;
                }
            }
        } else {
            steps.push(remaining);
        }

        steps
    }

    /// Humanized front-loaded decomposition for the band below the ceiling.
    ///
    /// The tail of the plan is shaped first: the final step is targeted into
    /// `[min_final_step, max_final_step]` and the second-to-last step is held
    /// at or above `min_penultimate_step`, preventing overshoot while keeping
    /// room for a last correction. The distance ahead of that tail is split
    /// by the decay profile's ratio sequence. Arc and jitter perturb only
    /// intermediate waypoints, so the endpoints are untouched.
    fn humanized_steps(&mut self, target: Vector2<f64>, distance: f64) -> Vec<Vector2<f64>> {
        let num_steps = if distance <= 50.0 {
            3
        } else if distance <= 100.0 {
            4
        } else if distance <= 200.0 {
            5
        } else {
            6
        };

        let final_fraction = if distance <= 100.0 { 0.08 } else { 0.067 };
        let final_target = (distance * final_fraction)
            .clamp(self.config.min_final_step, self.config.max_final_step);
        let penultimate_target = if num_steps > 2 {
            (distance * 0.12).max(self.config.min_penultimate_step)
        } else {
            0.0
        };

        let front_distance = distance - final_target - penultimate_target;
        if front_distance <= 0.0 {
            // The reserved tail does not fit; degrade to the two-step split.
            return self.medium_steps(target);
        }

        let front_steps = num_steps - if num_steps > 2 { 2 } else { 1 };
        let ratios = self.config.decay_profile.ratios(front_steps);

        let direction = target / distance;
        let perpendicular = Vector2::new(-direction.y, direction.x);

        // Cumulative distances of every waypoint except the endpoint.
        let mut cumulative = Vec::with_capacity(num_steps - 1);
        let mut along = 0.0;
        for ratio in &ratios {
            along += front_distance * ratio;
            cumulative.push(along);
        }
        if num_steps > 2 {
            cumulative.push(distance - final_target);
        }

        let waypoint_count = cumulative.len();
        let mut steps = Vec::with_capacity(num_steps);
        let mut previous = Vector2::zeros();
        for (idx, &along) in cumulative.iter().enumerate() {
            let progress = along / distance;
            let mut waypoint = direction * along;

            if self.config.arc_enabled && num_steps > 3 && progress > 0.1 && progress < 0.9 {
                let height = self
                    .config
                    .arc_height_factor
                    .min(distance * 0.01);
                let bow = 4.0 * progress * (1.0 - progress) * distance * height;
                waypoint += perpendicular * bow;
            }

            // The last two waypoints stay clean so the penultimate floor and
            // final cap hold exactly.
            if self.config.jitter_enabled && idx + 2 < waypoint_count {
                let amplitude = self.config.jitter_intensity * 0.5 * (1.0 - progress);
                waypoint += self.jitter(amplitude);
            }

            steps.push(waypoint - previous);
            previous = waypoint;
        }

        steps.push(target - previous);
        steps
    }

    /// Classic decomposition beyond the humanized ceiling: 6-8 steps on an
    /// eased cumulative-progress curve that front-loads movement.
    fn eased_steps(&mut self, target: Vector2<f64>, distance: f64) -> Vec<Vector2<f64>> {
        let num_steps = ((distance / 100.0) as usize + 3).clamp(6, 8);

        let mut steps = Vec::with_capacity(num_steps);
        let mut previous = Vector2::zeros();
        for i in 0..num_steps - 1 {
            let eased = Self::eased_progress(i, num_steps);
            let mut waypoint = target * eased;

            if self.config.jitter_enabled && i + 2 < num_steps {
                let amplitude = self.config.jitter_intensity * (1.0 - eased);
                waypoint += self.jitter(amplitude);
            }

            steps.push(waypoint - previous);
            previous = waypoint;
        }
        steps.push(target - previous);
        steps
    }

    /// Cumulative progress after step `index` of `total`: 50/70/85% by the
    /// third step, then a smooth quadratic ease-out to 100%.
    fn eased_progress(index: usize, total: usize) -> f64 {
        match index {
            0 => 0.5,
            1 => 0.7,
            2 => 0.85,
            _ => {
                let t = (index + 1) as f64 / total as f64;
                let remaining = ((t - 0.6) / 0.4).clamp(0.0, 1.0);
                0.85 + 0.15 * (1.0 - (1.0 - remaining).powi(2))
            }
        }
    }

    /// Isotropic uniform jitter with the given amplitude.
    fn jitter(&mut self, amplitude: f64) -> Vector2<f64> {
        if amplitude <= 0.0 {
            return Vector2::zeros();
        }
        Vector2::new(
            self.rng.gen_range(-amplitude..=amplitude),
            self.rng.gen_range(-amplitude..=amplitude),
        )
    }

    /// Delay after step `index` of `total`.
    ///
    /// The first (coarse) step of a multi-step plan waits longer, later
    /// (fine) steps shorter, with symmetric random variance. A zero base
    /// delay collapses the whole path to zero for latency-critical setups.
    fn step_delay(&mut self, index: usize, total: usize) -> Duration {
        if self.config.base_step_delay.is_zero() || total <= 1 || index + 1 == total {
            return Duration::ZERO;
        }

        let factor = if index == 0 { 1.5 } else { 0.8 };
        let mut secs = self.config.base_step_delay.as_secs_f64() * factor;

        let variance = self.config.step_delay_variance.as_secs_f64();
        if variance > 0.0 {
            secs += self.rng.gen_range(-variance..=variance);
        }

        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecayProfile;
    use approx::assert_relative_eq;

    fn planner(config: PlannerConfig) -> MotionPlanner {
        MotionPlanner::with_seed(config, 42)
    }

    fn quiet_config() -> PlannerConfig {
        PlannerConfig {
            jitter_enabled: false,
            arc_enabled: false,
            base_step_delay: Duration::ZERO,
            ..PlannerConfig::default()
        }
    }

    fn assert_sum_exact(plan: &MotionPlan, target: Vector2<f64>) {
        let sum = plan.step_sum();
        assert_relative_eq!(sum.x, target.x, epsilon = 1e-9);
        assert_relative_eq!(sum.y, target.y, epsilon = 1e-9);
    }

    #[test]
    fn test_micro_single_step() {
        let mut p = planner(quiet_config());
        let plan = p.plan(Vector2::new(10.0, 0.0));
        assert_eq!(plan.class, MotionClass::Micro);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].delta, Vector2::new(10.0, 0.0));
    }

    #[test]
    fn test_medium_two_step_split() {
        let mut p = planner(quiet_config());
        let plan = p.plan(Vector2::new(40.0, 0.0));
        assert_eq!(plan.class, MotionClass::Medium);
        assert_eq!(plan.steps.len(), 2);
        assert_relative_eq!(plan.steps[0].delta.x, 24.0, epsilon = 1e-12);
        assert_relative_eq!(plan.steps[1].delta.x, 16.0, epsilon = 1e-12);
        assert_sum_exact(&plan, Vector2::new(40.0, 0.0));
    }

    #[test]
    fn test_large_coarse_plus_fine() {
        let mut p = planner(quiet_config());
        let plan = p.plan(Vector2::new(100.0, 0.0));
        assert_eq!(plan.class, MotionClass::Large);
        // 80 coarse, remaining 20 -> clamp(20/20, 2, 3) = 2 equal fine steps.
        assert_eq!(plan.steps.len(), 3);
        assert_relative_eq!(plan.steps[0].delta.x, 80.0, epsilon = 1e-12);
        assert_relative_eq!(plan.steps[1].delta.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(plan.steps[2].delta.x, 10.0, epsilon = 1e-12);
        assert_sum_exact(&plan, Vector2::new(100.0, 0.0));
    }

    #[test]
    fn test_large_small_remainder_single_fine_step() {
        let config = PlannerConfig {
            large_first_ratio: 0.98,
            ..quiet_config()
        };
        let mut p = planner(config);
        let plan = p.plan(Vector2::new(100.0, 0.0));
        // Remaining 2 < precision threshold 3 -> one finishing step.
        assert_eq!(plan.steps.len(), 2);
        assert_sum_exact(&plan, Vector2::new(100.0, 0.0));
    }

    #[test]
    fn test_humanized_step_counts() {
        let mut p = planner(quiet_config());
        let plan = p.plan(Vector2::new(150.0, 0.0));
        assert_eq!(plan.class, MotionClass::ExtraLarge);
        assert_eq!(plan.steps.len(), 5);

        let plan = p.plan(Vector2::new(250.0, 0.0));
        assert_eq!(plan.steps.len(), 6);
    }

    #[test]
    fn test_humanized_final_cap_and_penultimate_floor() {
        for profile in [
            DecayProfile::Aggressive,
            DecayProfile::Balanced,
            DecayProfile::Gentle,
            DecayProfile::Linear,
        ] {
            let config = PlannerConfig {
                decay_profile: profile,
                ..PlannerConfig::default()
            };
            let mut p = planner(config);
            for d in [125.0, 150.0, 180.0, 220.0, 260.0, 300.0] {
                let target = Vector2::new(d * 0.8, d * 0.6);
                let plan = p.plan(target);
                let n = plan.steps.len();
                assert!(n >= 2);
                let final_step = plan.steps[n - 1].distance();
                let penultimate = plan.steps[n - 2].distance();
                assert!(
                    final_step < 20.0,
                    "final step {final_step:.2} >= 20 at d={d} ({profile:?})"
                );
                assert!(
                    penultimate >= 20.0 - 1e-9,
                    "penultimate {penultimate:.2} < 20 at d={d} ({profile:?})"
                );
                assert_sum_exact(&plan, target);
            }
        }
    }

    #[test]
    fn test_sum_exact_across_bands_and_profiles() {
        for profile in [
            DecayProfile::Aggressive,
            DecayProfile::Balanced,
            DecayProfile::Gentle,
            DecayProfile::Linear,
        ] {
            for (jitter, arc) in [(false, false), (true, false), (false, true), (true, true)] {
                let config = PlannerConfig {
                    decay_profile: profile,
                    jitter_enabled: jitter,
                    arc_enabled: arc,
                    base_step_delay: Duration::ZERO,
                    ..PlannerConfig::default()
                };
                let mut p = planner(config);
                for d in [1.0, 14.0, 15.0, 40.0, 60.0, 99.0, 120.0, 121.0, 200.0, 300.0, 301.0,
                    450.0, 700.0]
                {
                    let target = Vector2::new(d * 0.6, -d * 0.8);
                    let plan = p.plan(target);
                    assert_sum_exact(&plan, target);
                }
            }
        }
    }

    #[test]
    fn test_arc_bows_only_the_middle() {
        let config = PlannerConfig {
            jitter_enabled: false,
            arc_enabled: true,
            ..quiet_config()
        };
        let mut p = planner(config);
        let target = Vector2::new(200.0, 0.0);
        let plan = p.plan(target);

        // Walk the waypoints: interior ones leave the straight line, but the
        // path still ends exactly on target.
        let mut position = Vector2::zeros();
        let mut max_off_axis: f64 = 0.0;
        for step in &plan.steps {
            position += step.delta;
            max_off_axis = max_off_axis.max(position.y.abs());
        }
        assert!(max_off_axis > 0.0, "arc should bow the path");
        assert_relative_eq!(position.x, 200.0, epsilon = 1e-9);
        assert_relative_eq!(position.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_eased_band_front_loads() {
        let mut p = planner(quiet_config());
        let target = Vector2::new(400.0, 0.0);
        let plan = p.plan(target);
        assert!(plan.steps.len() >= 6 && plan.steps.len() <= 8);

        let mut cumulative = 0.0;
        let fractions: Vec<f64> = plan
            .steps
            .iter()
            .map(|s| {
                cumulative += s.delta.x;
                cumulative / 400.0
            })
            .collect();
        assert_relative_eq!(fractions[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(fractions[1], 0.7, epsilon = 1e-12);
        assert_relative_eq!(fractions[2], 0.85, epsilon = 1e-12);
        assert_relative_eq!(*fractions.last().unwrap(), 1.0, epsilon = 1e-9);
        // Monotonically increasing progress.
        for pair in fractions.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_eased_step_count_scales_with_distance() {
        let mut p = planner(quiet_config());
        assert_eq!(p.plan(Vector2::new(301.0, 0.0)).steps.len(), 6);
        assert_eq!(p.plan(Vector2::new(700.0, 0.0)).steps.len(), 8);
    }

    #[test]
    fn test_zero_base_delay_collapses_delays() {
        let mut p = planner(quiet_config());
        let plan = p.plan(Vector2::new(250.0, 100.0));
        assert!(plan.steps.iter().all(|s| s.delay.is_zero()));
    }

    #[test]
    fn test_delays_scale_coarse_up_fine_down() {
        let config = PlannerConfig {
            base_step_delay: Duration::from_millis(10),
            step_delay_variance: Duration::ZERO,
            ..quiet_config()
        };
        let mut p = planner(config);
        let plan = p.plan(Vector2::new(40.0, 0.0));
        assert_eq!(plan.steps[0].delay, Duration::from_millis(15));
        // No delay after the last step.
        assert_eq!(plan.steps[1].delay, Duration::ZERO);

        let plan = p.plan(Vector2::new(100.0, 0.0));
        assert_eq!(plan.steps[0].delay, Duration::from_millis(15));
        assert_eq!(plan.steps[1].delay, Duration::from_millis(8));
        assert_eq!(plan.steps[2].delay, Duration::ZERO);
    }

    #[test]
    fn test_seeded_planner_is_reproducible() {
        let config = PlannerConfig::default();
        let target = Vector2::new(180.0, -90.0);
        let plan_a = MotionPlanner::with_seed(config.clone(), 7).plan(target);
        let plan_b = MotionPlanner::with_seed(config, 7).plan(target);
        assert_eq!(plan_a, plan_b);
    }

    #[test]
    fn test_degenerate_tail_degrades_to_split() {
        // Shrink the bands so the humanized branch sees a distance smaller
        // than its reserved tail.
        let config = PlannerConfig {
            micro_threshold: 2.0,
            medium_threshold: 4.0,
            large_threshold: 6.0,
            humanized_ceiling: 300.0,
            ..quiet_config()
        };
        let mut p = planner(config);
        let target = Vector2::new(20.0, 0.0);
        let plan = p.plan(target);
        assert_eq!(plan.steps.len(), 2);
        assert_sum_exact(&plan, target);
    }

    #[test]
    fn test_classification_boundaries() {
        let p = planner(quiet_config());
        assert_eq!(p.classify(15.0), MotionClass::Micro);
        assert_eq!(p.classify(15.1), MotionClass::Medium);
        assert_eq!(p.classify(60.0), MotionClass::Medium);
        assert_eq!(p.classify(120.0), MotionClass::Large);
        assert_eq!(p.classify(120.1), MotionClass::ExtraLarge);
    }
}
