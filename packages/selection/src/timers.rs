//! # Timer Queue
//!
//! One queue per session replaces ad-hoc timeouts. Each [`TimerKind`] has at
//! most one pending deadline: scheduling a kind again moves it (restart
//! semantics), cancelling removes it. Nothing fires on its own; the owner
//! calls [`TimerQueue::drain_due`] with the current time.

use crate::clock::Timestamp;
use serde::Serialize;
use std::collections::HashMap;

/// What a pending timer does when it fires
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum TimerKind {
    /// The active transition lock runs out
    LockExpiry,

    /// One-shot unfreeze attempt for a frozen handler id
    StabilityRetry(String),

    /// Periodic staleness sweep of the anchor registry
    AnchorSweep,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: HashMap<TimerKind, Timestamp>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` at `at`, replacing any pending deadline for it
    pub fn schedule(&mut self, kind: TimerKind, at: Timestamp) {
        self.deadlines.insert(kind, at);
    }

    /// Cancel a pending timer. Returns whether one was pending.
    pub fn cancel(&mut self, kind: &TimerKind) -> bool {
        self.deadlines.remove(kind).is_some()
    }

    /// Cancel every pending timer matching the predicate
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&TimerKind) -> bool) {
        self.deadlines.retain(|kind, _| !predicate(kind));
    }

    pub fn is_scheduled(&self, kind: &TimerKind) -> bool {
        self.deadlines.contains_key(kind)
    }

    pub fn deadline(&self, kind: &TimerKind) -> Option<Timestamp> {
        self.deadlines.get(kind).copied()
    }

    /// Earliest pending deadline, for arming a single host timer
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.deadlines.values().min().copied()
    }

    /// Pending timers, earliest first
    pub fn pending(&self) -> Vec<(Timestamp, TimerKind)> {
        let mut pending: Vec<(Timestamp, TimerKind)> = self
            .deadlines
            .iter()
            .map(|(kind, at)| (*at, kind.clone()))
            .collect();
        pending.sort();
        pending
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<TimerKind> {
        let mut due: Vec<(Timestamp, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(kind, at)| (*at, kind.clone()))
            .collect();
        due.sort();

        for (_, kind) in &due {
            self.deadlines.remove(kind);
        }

        due.into_iter().map(|(_, kind)| kind).collect()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
