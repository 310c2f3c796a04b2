//! # Logical Clock
//!
//! Every component takes time as an explicit [`Timestamp`] argument. The
//! session reads its [`Clock`] once per call and threads that value through
//! the pipeline, so one tick sees one instant.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Milliseconds on a session's clock. Only differences are meaningful.
pub type Timestamp = u64;

/// Source of the current time for a session
pub trait Clock: std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Monotonic wall clock, counting from construction
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

/// Hand-driven clock for tests and trace replay
///
/// Clones share the same time, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.set(at);
    }

    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().saturating_add(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}
