//! Instance liveness tracking
//!
//! Resource completion events arrive on later turns of the event loop and may
//! outlive the instance that started them. Completion handlers therefore hold a
//! [`LivenessWatch`] instead of the instance: once the owning [`Liveness`] is
//! killed (or dropped) every watch reports dead and the handler does nothing.

use std::cell::Cell;
use std::rc::{Rc, Weak};

/// Liveness flag owned by a lazy loader instance
#[derive(Debug)]
pub struct Liveness {
    alive: Rc<Cell<bool>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Whether the owner is still live
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Mark the owner dead. Irreversible.
    pub fn kill(&self) {
        self.alive.set(false);
    }

    /// Weak observer of this flag
    pub fn watch(&self) -> LivenessWatch {
        LivenessWatch {
            alive: Rc::downgrade(&self.alive),
        }
    }
}

/// Weak view of a [`Liveness`] flag
#[derive(Debug, Clone)]
pub struct LivenessWatch {
    alive: Weak<Cell<bool>>,
}

impl LivenessWatch {
    /// Whether the owner is still live; false once killed or dropped
    pub fn is_alive(&self) -> bool {
        self.alive.upgrade().is_some_and(|alive| alive.get())
    }
}
