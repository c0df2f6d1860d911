//! Print the step decomposition the planner produces for a displacement.
//!
//! Handy when tuning band thresholds or decay profiles: shows each step's
//! delta, distance, delay, and cumulative progress without driving any
//! hardware.

use anyhow::Result;
use clap::Parser;
use nalgebra::Vector2;

use reticle::{DecayProfile, MotionPlanner, PlannerConfig};

/// Trace a motion plan for a given displacement
#[derive(Parser, Debug)]
#[command(name = "plan_trace")]
#[command(about = "Show the planned step decomposition for a displacement")]
struct Args {
    /// Horizontal displacement in actuation units
    dx: f64,

    /// Vertical displacement in actuation units
    dy: f64,

    /// Decay profile for the humanized band
    #[arg(long, value_enum, default_value = "balanced")]
    profile: ProfileArg,

    /// RNG seed; omit for entropy seeding
    #[arg(long)]
    seed: Option<u64>,

    /// Disable jitter
    #[arg(long)]
    no_jitter: bool,

    /// Disable the arc offset
    #[arg(long)]
    no_arc: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProfileArg {
    Aggressive,
    Balanced,
    Gentle,
    Linear,
}

impl From<ProfileArg> for DecayProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Aggressive => DecayProfile::Aggressive,
            ProfileArg::Balanced => DecayProfile::Balanced,
            ProfileArg::Gentle => DecayProfile::Gentle,
            ProfileArg::Linear => DecayProfile::Linear,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PlannerConfig {
        decay_profile: args.profile.into(),
        jitter_enabled: !args.no_jitter,
        arc_enabled: !args.no_arc,
        ..PlannerConfig::default()
    };
    config.validate()?;

    let mut planner = match args.seed {
        Some(seed) => MotionPlanner::with_seed(config, seed),
        None => MotionPlanner::new(config),
    };

    let target = Vector2::new(args.dx, args.dy);
    let plan = planner.plan(target);

    println!(
        "displacement ({:.1}, {:.1}), distance {:.1}, class {:?}, {} step(s)",
        target.x,
        target.y,
        plan.distance,
        plan.class,
        plan.steps.len()
    );

    let mut cumulative = Vector2::zeros();
    for (i, step) in plan.steps.iter().enumerate() {
        cumulative += step.delta;
        let progress = if plan.distance > 0.0 {
            cumulative.norm() / plan.distance * 100.0
        } else {
            100.0
        };
        println!(
            "  step {:>2}: ({:>7.2}, {:>7.2})  len {:>6.2}  delay {:>5.1}ms  cumulative {:>5.1}%",
            i + 1,
            step.delta.x,
            step.delta.y,
            step.distance(),
            step.delay.as_secs_f64() * 1000.0,
            progress
        );
    }

    let sum = plan.step_sum();
    println!(
        "sum ({:.6}, {:.6}), residual {:.2e}",
        sum.x,
        sum.y,
        (sum - target).norm()
    );

    Ok(())
}
