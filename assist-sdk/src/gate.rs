//! Single-slot mutual exclusion for in-flight assistant calls

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Admits at most one holder at a time. Never blocks.
#[derive(Debug, Default)]
pub struct RequestGate {
    held: AtomicBool,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate if free. Returns `false` if it is already held.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Free the gate. Safe to call when not held.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// `try_acquire` returning a guard that releases on drop
    pub fn acquire_guard(self: &Arc<Self>) -> Option<GateGuard> {
        if self.try_acquire() {
            Some(GateGuard {
                gate: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

/// Holds the gate until dropped, including during unwinding.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard {
    gate: Arc<RequestGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}
