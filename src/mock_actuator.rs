//! In-memory actuator for tests and tooling.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use nalgebra::Vector2;

use crate::actuator::{ActivationButton, Actuator};
use crate::error::ActuationError;

/// Records every move and pulse it receives; failure injection via flags.
#[derive(Debug, Default)]
pub struct MockActuator {
    moves: Mutex<Vec<Vector2<f64>>>,
    activations: AtomicU64,
    fail_moves: AtomicBool,
    fail_pulses: AtomicBool,
}

impl MockActuator {
    /// Create a mock that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `pointer_move` calls fail.
    pub fn set_fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `activate` calls fail.
    pub fn set_fail_pulses(&self, fail: bool) {
        self.fail_pulses.store(fail, Ordering::SeqCst);
    }

    /// All deltas received so far, oldest first.
    pub fn moves(&self) -> Vec<Vector2<f64>> {
        self.moves.lock().unwrap().clone()
    }

    /// Vector sum of all deltas received so far.
    pub fn total_moved(&self) -> Vector2<f64> {
        self.moves
            .lock()
            .unwrap()
            .iter()
            .fold(Vector2::zeros(), |acc, m| acc + m)
    }

    /// Number of successful activation pulses.
    pub fn activation_count(&self) -> u64 {
        self.activations.load(Ordering::SeqCst)
    }

    /// Forget recorded moves.
    pub fn clear(&self) {
        self.moves.lock().unwrap().clear();
    }
}

impl Actuator for MockActuator {
    fn pointer_move(&self, dx: f64, dy: f64) -> Result<(), ActuationError> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(ActuationError::MoveRejected { dx, dy });
        }
        self.moves.lock().unwrap().push(Vector2::new(dx, dy));
        Ok(())
    }

    fn activate(&self, _button: ActivationButton) -> Result<(), ActuationError> {
        if self.fail_pulses.load(Ordering::SeqCst) {
            return Err(ActuationError::PulseRejected("injected failure".into()));
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_moves() {
        let actuator = MockActuator::new();
        actuator.pointer_move(3.0, 4.0).unwrap();
        actuator.pointer_move(-1.0, 2.0).unwrap();
        assert_eq!(actuator.moves().len(), 2);
        assert_eq!(actuator.total_moved(), Vector2::new(2.0, 6.0));
    }

    #[test]
    fn test_failure_injection() {
        let actuator = MockActuator::new();
        actuator.set_fail_moves(true);
        assert!(actuator.pointer_move(1.0, 0.0).is_err());
        assert!(actuator.moves().is_empty());

        actuator.set_fail_moves(false);
        assert!(actuator.pointer_move(1.0, 0.0).is_ok());
    }

    #[test]
    fn test_counts_activations() {
        let actuator = MockActuator::new();
        actuator.activate(ActivationButton::Primary).unwrap();
        actuator.activate(ActivationButton::Primary).unwrap();
        assert_eq!(actuator.activation_count(), 2);

        actuator.set_fail_pulses(true);
        assert!(actuator.activate(ActivationButton::Primary).is_err());
        assert_eq!(actuator.activation_count(), 2);
    }
}
