//! Actuation seam.
//!
//! The core drives exactly one abstract actuator. Backend selection, retry
//! chains, and transport details all live behind this trait in the
//! collaborating crate; nothing here knows which physical device moves the
//! pointer.

use serde::{Deserialize, Serialize};

use crate::error::ActuationError;

/// Which discrete control an activation pulse presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationButton {
    /// The primary control (default).
    #[default]
    Primary,
    /// The secondary control.
    Secondary,
}

/// The two capabilities the core requires from a pointer backend.
///
/// Implementations are expected to return quickly; the executor holds no
/// internal lock across these calls, but a slow `pointer_move` directly
/// stretches motion latency. Backends that need queuing should do it
/// internally.
pub trait Actuator: Send + Sync {
    /// Move the pointer by a relative delta in actuation units.
    fn pointer_move(&self, dx: f64, dy: f64) -> Result<(), ActuationError>;

    /// Issue one discrete press pulse on the given control.
    fn activate(&self, button: ActivationButton) -> Result<(), ActuationError>;
}
