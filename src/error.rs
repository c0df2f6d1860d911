use thiserror::Error;

/// Errors raised when a configuration fails validation at construction.
///
/// Construction fails fast with the offending value; nothing is silently
/// clamped into range.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A dimension that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroDimension {
        /// Name of the offending field.
        name: &'static str,
    },

    /// Horizontal field of view outside the open interval (0, 180).
    #[error("horizontal field of view must be within (0, 180) degrees, got {0}")]
    FovOutOfRange(f64),

    /// Capture region larger than the display it is cut from.
    #[error("capture size {capture} exceeds display extent {display}")]
    CaptureExceedsDisplay {
        /// Configured capture size in pixels.
        capture: u32,
        /// Smaller display extent in pixels.
        display: u32,
    },

    /// Distance band thresholds are not strictly increasing.
    #[error("distance thresholds must be strictly increasing: micro {micro} < medium {medium} < large {large} < ceiling {ceiling}")]
    ThresholdOrder {
        micro: f64,
        medium: f64,
        large: f64,
        ceiling: f64,
    },

    /// A ratio parameter left the open interval (0, 1).
    #[error("{name} must be within (0, 1), got {value}")]
    RatioOutOfRange { name: &'static str, value: f64 },

    /// A threshold or tolerance that must be positive was not.
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// Final-step bounds are inverted.
    #[error("final step bounds are inverted: min {min} > max {max}")]
    FinalStepBounds { min: f64, max: f64 },

    /// Fine-step count range is empty or starts below one.
    #[error("fine step range {min}..={max} is invalid")]
    FineStepRange { min: usize, max: usize },

    /// The hysteresis window cannot count zero samples.
    #[error("required sample count must be at least 1")]
    ZeroRequiredSamples,

    /// A duration that must be non-zero was zero.
    #[error("{name} must be a non-zero duration")]
    ZeroDuration { name: &'static str },
}

/// Errors reported by an [`Actuator`](crate::actuator::Actuator) backend.
///
/// A failure aborts only the motion task (or pulse) that triggered it; it is
/// counted and surfaced via status, and never propagates to the submitting
/// thread.
#[derive(Error, Debug)]
pub enum ActuationError {
    /// The backend rejected a relative pointer move.
    #[error("actuator rejected relative move ({dx:.1}, {dy:.1})")]
    MoveRejected {
        /// Requested horizontal delta.
        dx: f64,
        /// Requested vertical delta.
        dy: f64,
    },

    /// The backend rejected an activation pulse.
    #[error("activation pulse rejected: {0}")]
    PulseRejected(String),

    /// The backend is not reachable at all.
    #[error("actuation backend unavailable: {0}")]
    Unavailable(String),
}
