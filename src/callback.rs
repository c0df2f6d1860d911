//! Event callbacks for external collaborators.
//!
//! An input-suppression collaborator registers here to learn when the core is
//! actively driving the pointer; supervisors can watch task lifecycle and
//! activation events the same way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nalgebra::Vector2;

use crate::executor::TaskStatus;
use crate::timestamp::Timestamp;

/// Events emitted by the coordinator and executor.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A motion task started executing.
    MotionStarted {
        task_id: u64,
        target: Vector2<f64>,
        locked: bool,
    },
    /// A motion task reached a terminal state.
    MotionEnded { task_id: u64, status: TaskStatus },
    /// Pointer motion is paused for an activation pulse.
    MovementPaused,
    /// Pointer motion may resume after an activation pulse.
    MovementResumed,
    /// An activation pulse was issued.
    Activated {
        at: Timestamp,
        /// Whether the actuator accepted the pulse.
        succeeded: bool,
    },
}

/// Callback ID for registration/deregistration.
pub type CallbackId = u64;

type EventCallback = Arc<dyn Fn(&CoordinatorEvent) + Send + Sync>;

/// Id-keyed registry of event callbacks.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Mutex<HashMap<CallbackId, EventCallback>>,
    next_id: Mutex<CallbackId>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, returning an id for later deregistration.
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&CoordinatorEvent) + Send + Sync + 'static,
    {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        self.callbacks.lock().unwrap().insert(id, Arc::new(callback));
        id
    }

    /// Remove a callback; returns false if the id was unknown.
    pub fn deregister(&self, id: CallbackId) -> bool {
        self.callbacks.lock().unwrap().remove(&id).is_some()
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    /// True when no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().unwrap().is_empty()
    }

    /// Deliver an event to every registered callback.
    ///
    /// Callbacks are cloned out before invocation so the registry lock is not
    /// held while user code runs.
    pub fn emit(&self, event: &CoordinatorEvent) {
        let snapshot: Vec<EventCallback> =
            self.callbacks.lock().unwrap().values().cloned().collect();
        for callback in snapshot {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_emit_deregister() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let id = registry.register(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.len(), 1);

        registry.emit(&CoordinatorEvent::MovementPaused);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));

        registry.emit(&CoordinatorEvent::MovementResumed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_callbacks_all_fire() {
        let registry = CallbackRegistry::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a_clone = a.clone();
        registry.register(move |_| {
            a_clone.fetch_add(1, Ordering::SeqCst);
        });
        let b_clone = b.clone();
        registry.register(move |_| {
            b_clone.fetch_add(10, Ordering::SeqCst);
        });

        registry.emit(&CoordinatorEvent::MotionEnded {
            task_id: 1,
            status: TaskStatus::Completed,
        });

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_reentrant_registration_does_not_deadlock() {
        let registry = Arc::new(CallbackRegistry::new());
        let registry_clone = registry.clone();
        registry.register(move |_| {
            // Emitting must not hold the registry lock across callbacks.
            let _ = registry_clone.len();
        });
        registry.emit(&CoordinatorEvent::MovementPaused);
    }
}
