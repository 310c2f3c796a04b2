//! # Stability Guard
//!
//! Rate-limits attachment of selection-event handlers per handler id. An
//! editor that re-attaches its handlers in a render loop trips the guard,
//! which freezes the id for a frame and lets it recover on its own.
//!
//! ## States
//!
//! ```text
//!   unarmed ──first attach──▶ armed ──rate breach──▶ frozen
//!                               ▲                       │
//!                               └─expiry / retry / manual unfreeze
//! ```
//!
//! The first attach for an id is never blocked. Leaving `frozen` starts a
//! fresh tracking window, so the attach after a freeze always succeeds.

use crate::clock::Timestamp;
use crate::config::StabilityConfig;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Rates are never computed over less than this many ms
const MIN_RATE_WINDOW_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardPhase {
    Unarmed,
    Armed,
    Frozen,
}

#[derive(Debug, Clone, Default)]
struct StabilityState {
    owner: Option<String>,
    attachment_count: u32,
    detachment_count: u32,
    window_start: Timestamp,
    has_had_successful_attach: bool,
    frozen_until: Option<Timestamp>,
    retry_at: Option<Timestamp>,
    last_freeze_warning: Option<Timestamp>,
}

impl StabilityState {
    fn new(now: Timestamp) -> Self {
        Self {
            window_start: now,
            ..Self::default()
        }
    }

    fn attachments_per_second(&self, now: Timestamp) -> f64 {
        let elapsed = now.saturating_sub(self.window_start).max(MIN_RATE_WINDOW_MS);
        self.attachment_count as f64 * 1000.0 / elapsed as f64
    }

    fn restart_window(&mut self, now: Timestamp) {
        self.attachment_count = 0;
        self.window_start = now;
    }

    fn thaw(&mut self, now: Timestamp) {
        self.frozen_until = None;
        self.retry_at = None;
        self.restart_window(now);
    }
}

/// Debug view of one handler id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilityStats {
    pub id: String,
    pub owner: Option<String>,
    pub phase: GuardPhase,
    pub attachment_count: u32,
    pub detachment_count: u32,
    pub attachments_per_second: f64,
    pub is_frozen: bool,
    pub frozen_until: Option<Timestamp>,
    pub retry_at: Option<Timestamp>,
    pub time_remaining_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Allowed,

    /// Rejected because the id is still frozen
    Blocked,

    /// This attach tripped the rate limit; an automatic unfreeze is due
    /// at `retry_at`
    Froze { retry_at: Timestamp },
}

impl AttachOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AttachOutcome::Allowed)
    }
}

#[derive(Debug)]
pub struct StabilityGuard {
    config: StabilityConfig,
    states: HashMap<String, StabilityState>,
}

impl StabilityGuard {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn attempt_attach(&mut self, id: &str, owner: Option<&str>, now: Timestamp) -> AttachOutcome {
        if !self.config.enabled {
            return AttachOutcome::Allowed;
        }

        let config = &self.config;
        let state = self
            .states
            .entry(id.to_string())
            .or_insert_with(|| StabilityState::new(now));
        if let Some(owner) = owner {
            state.owner = Some(owner.to_string());
        }

        if let Some(frozen_until) = state.frozen_until {
            if now < frozen_until {
                let warn_due = state
                    .last_freeze_warning
                    .map_or(true, |at| now.saturating_sub(at) >= config.freeze_warning_interval_ms);
                if warn_due {
                    warn!(
                        id = %id,
                        remaining_ms = frozen_until - now,
                        "Attachment blocked while frozen"
                    );
                    state.last_freeze_warning = Some(now);
                }
                return AttachOutcome::Blocked;
            }
            info!(id = %id, "Freeze expired, attachments resumed");
            state.thaw(now);
        }

        if !state.has_had_successful_attach {
            state.has_had_successful_attach = true;
            state.restart_window(now);
            state.attachment_count = 1;
            return AttachOutcome::Allowed;
        }

        if now.saturating_sub(state.window_start) > config.tracking_window_ms {
            state.restart_window(now);
        }
        state.attachment_count += 1;

        let rate = state.attachments_per_second(now);
        if rate > config.max_attachments_per_second {
            let frozen_until = now + config.freeze_duration_ms;
            let retry_at = frozen_until + config.retry_grace_ms;
            error!(
                id = %id,
                owner = state.owner.as_deref().unwrap_or("unknown"),
                rate,
                attachments = state.attachment_count,
                "Handler thrashing detected, freezing attachments"
            );
            state.frozen_until = Some(frozen_until);
            state.retry_at = Some(retry_at);
            return AttachOutcome::Froze { retry_at };
        }

        AttachOutcome::Allowed
    }

    /// Detaches are counted, never blocked
    pub fn attempt_detach(&mut self, id: &str, owner: Option<&str>, now: Timestamp) {
        let state = self
            .states
            .entry(id.to_string())
            .or_insert_with(|| StabilityState::new(now));
        if let Some(owner) = owner {
            state.owner = Some(owner.to_string());
        }
        state.detachment_count += 1;
    }

    /// Whether `id` is frozen right now; an elapsed freeze is cleared here
    pub fn is_frozen(&mut self, id: &str, now: Timestamp) -> bool {
        let Some(state) = self.states.get_mut(id) else {
            return false;
        };
        match state.frozen_until {
            Some(until) if now < until => true,
            Some(_) => {
                info!(id = %id, "Freeze expired, attachments resumed");
                state.thaw(now);
                false
            }
            None => false,
        }
    }

    /// Scheduled unfreeze; returns false when the id had already recovered
    pub fn auto_retry(&mut self, id: &str, now: Timestamp) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.frozen_until.is_some() => {
                info!(id = %id, "Automatic unfreeze");
                state.thaw(now);
                true
            }
            _ => false,
        }
    }

    pub fn manual_unfreeze(&mut self, id: &str, now: Timestamp) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.frozen_until.is_some() => {
                info!(id = %id, "Manual unfreeze");
                state.thaw(now);
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self, id: &str, now: Timestamp) -> GuardPhase {
        match self.states.get(id) {
            Some(state) if state.frozen_until.is_some_and(|until| now < until) => {
                GuardPhase::Frozen
            }
            Some(state) if state.has_had_successful_attach => GuardPhase::Armed,
            _ => GuardPhase::Unarmed,
        }
    }

    pub fn stats(&self, id: &str, now: Timestamp) -> Option<StabilityStats> {
        let state = self.states.get(id)?;
        let frozen_until = state.frozen_until.filter(|until| now < *until);

        Some(StabilityStats {
            id: id.to_string(),
            owner: state.owner.clone(),
            phase: self.phase(id, now),
            attachment_count: state.attachment_count,
            detachment_count: state.detachment_count,
            attachments_per_second: state.attachments_per_second(now),
            is_frozen: frozen_until.is_some(),
            frozen_until,
            retry_at: state.retry_at,
            time_remaining_ms: frozen_until.map_or(0, |until| until - now),
        })
    }

    pub fn all_stats(&self, now: Timestamp) -> Vec<StabilityStats> {
        let mut ids: Vec<&String> = self.states.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.stats(id, now))
            .collect()
    }

    /// Forget every id
    pub fn reset(&mut self) {
        info!(ids = self.states.len(), "Stability state reset");
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> StabilityGuard {
        StabilityGuard::new(StabilityConfig::default())
    }

    #[test]
    fn test_first_attach_is_always_allowed() {
        let mut guard = guard();
        assert_eq!(guard.phase("toolbar", 0), GuardPhase::Unarmed);
        assert!(guard.attempt_attach("toolbar", Some("ElementToolbar"), 0).is_allowed());
        assert_eq!(guard.phase("toolbar", 0), GuardPhase::Armed);
    }

    #[test]
    fn test_burst_freezes_on_eleventh_attach() {
        let mut guard = guard();
        for i in 0..10 {
            assert!(guard.attempt_attach("burst", None, i * 10).is_allowed(), "attach {i}");
        }

        let outcome = guard.attempt_attach("burst", None, 100);
        assert_eq!(outcome, AttachOutcome::Froze { retry_at: 166 });
        assert!(guard.is_frozen("burst", 110));
        assert_eq!(guard.attempt_attach("burst", None, 110), AttachOutcome::Blocked);
    }

    #[test]
    fn test_steady_rate_never_freezes() {
        let mut guard = guard();
        for i in 0..100 {
            assert!(guard.attempt_attach("steady", None, i * 150).is_allowed());
        }
        assert!(!guard.is_frozen("steady", 15_000));
    }

    #[test]
    fn test_recovers_after_freeze_without_manual_unfreeze() {
        let mut guard = guard();
        for i in 0..11 {
            guard.attempt_attach("burst", None, i);
        }
        assert!(guard.is_frozen("burst", 12));

        // freeze ended at 26
        assert!(guard.attempt_attach("burst", None, 27).is_allowed());
        let stats = guard.stats("burst", 27).unwrap();
        assert_eq!(stats.attachment_count, 1);
        assert!(!stats.is_frozen);
    }

    #[test]
    fn test_auto_retry_and_manual_unfreeze() {
        let mut guard = guard();
        for i in 0..11 {
            guard.attempt_attach("a", None, i);
            guard.attempt_attach("b", None, i);
        }

        assert!(guard.manual_unfreeze("a", 12));
        assert!(!guard.is_frozen("a", 12));
        assert!(!guard.manual_unfreeze("a", 13));

        assert!(guard.auto_retry("b", 76));
        assert!(!guard.auto_retry("b", 77));
        assert!(!guard.auto_retry("missing", 77));
    }

    #[test]
    fn test_blocked_attaches_warn_but_do_not_extend_freeze() {
        let mut guard = guard();
        for i in 0..11 {
            guard.attempt_attach("x", None, i);
        }
        let until = guard.stats("x", 10).unwrap().frozen_until;
        for t in 11..20 {
            assert_eq!(guard.attempt_attach("x", None, t), AttachOutcome::Blocked);
        }
        assert_eq!(guard.stats("x", 20).unwrap().frozen_until, until);
    }

    #[test]
    fn test_detach_is_counted_never_blocked() {
        let mut guard = guard();
        guard.attempt_detach("toolbar", Some("SectionToolbar"), 0);
        guard.attempt_detach("toolbar", None, 1);

        let stats = guard.stats("toolbar", 1).unwrap();
        assert_eq!(stats.detachment_count, 2);
        assert_eq!(stats.owner.as_deref(), Some("SectionToolbar"));
        assert_eq!(stats.phase, GuardPhase::Unarmed);
    }

    #[test]
    fn test_disabled_guard_allows_everything() {
        let mut guard = StabilityGuard::new(StabilityConfig {
            enabled: false,
            ..StabilityConfig::default()
        });
        for i in 0..50 {
            assert!(guard.attempt_attach("dev", None, i).is_allowed());
        }
        assert!(guard.stats("dev", 50).is_none());
    }

    #[test]
    fn test_window_rolls_over() {
        let mut guard = guard();
        guard.attempt_attach("slow", None, 0);
        for i in 1..=10 {
            guard.attempt_attach("slow", None, i * 180);
        }
        // 1800 ms in: 11 attaches over 1.8 s
        assert!(!guard.is_frozen("slow", 1800));

        guard.attempt_attach("slow", None, 2100);
        assert_eq!(guard.stats("slow", 2100).unwrap().attachment_count, 1);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut guard = guard();
        guard.attempt_attach("a", None, 0);
        guard.attempt_attach("b", None, 0);
        assert_eq!(guard.all_stats(0).len(), 2);

        guard.reset();
        assert!(guard.all_stats(0).is_empty());
        assert_eq!(guard.phase("a", 0), GuardPhase::Unarmed);
    }
}
