//! # Transition Locks
//!
//! A click usually reaches the editor as a burst of state changes: deselect,
//! reselect, re-render. Resolving each one naturally makes toolbars flicker.
//! A transition lock pins the toolbar chosen by the transition for a short
//! window; during it the locked toolbar is what the session reports, whatever
//! the resolver says.
//!
//! - A new transition restarts the lock (at most one lock, no queue).
//! - An identical transition inside the debounce window is dropped.
//! - Expiry does not replay missed states; the next resolution wins.

use crate::clock::Timestamp;
use crate::config::LockConfig;
use crate::resolver::{ElementRef, ToolbarTarget, ToolbarType};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
struct TransitionLock {
    toolbar: ToolbarType,
    target: Option<ToolbarTarget>,
    reason: String,
    expires_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
struct LastTrigger {
    toolbar: ToolbarType,
    reason: String,
    at: Timestamp,
}

/// Read-only copy of the lock as seen at one instant
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub is_locked: bool,
    pub locked_toolbar: Option<ToolbarType>,
    pub locked_target: Option<ToolbarTarget>,
    pub lock_reason: Option<String>,
    pub time_remaining_ms: u64,
}

/// What a lock request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// A lock is (re)started and runs until `expires_at`
    Started { expires_at: Timestamp },

    /// Same transition fired again inside the debounce window
    Debounced,

    /// The transition has nothing to hold; any lock was dropped
    Released,
}

#[derive(Debug)]
pub struct TransitionLockManager {
    config: LockConfig,
    current: Option<TransitionLock>,
    last_trigger: Option<LastTrigger>,
}

impl TransitionLockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            current: None,
            last_trigger: None,
        }
    }

    /// Text editing started (lock the text toolbar) or stopped (hand back
    /// to the element toolbar on the element that was being edited)
    pub fn lock_for_text_editing(
        &mut self,
        is_editing: bool,
        target: Option<&ElementRef>,
        now: Timestamp,
    ) -> LockOutcome {
        match (is_editing, target) {
            (true, target) => {
                let reason = match target {
                    Some(t) => format!("text-editing-start:{t}"),
                    None => "text-editing-start".to_string(),
                };
                self.lock(ToolbarType::Text, target.map(Into::into), reason, now)
            }
            (false, Some(target)) => self.lock(
                ToolbarType::Element,
                Some(target.into()),
                format!("text-editing-end:{target}"),
                now,
            ),
            (false, None) => {
                self.unlock();
                LockOutcome::Released
            }
        }
    }

    pub fn lock_for_element_change(
        &mut self,
        target: &ElementRef,
        toolbar: ToolbarType,
        now: Timestamp,
    ) -> LockOutcome {
        self.lock(
            toolbar,
            Some(target.into()),
            format!("element-change:{target}"),
            now,
        )
    }

    pub fn lock_for_section_change(&mut self, section_id: &str, now: Timestamp) -> LockOutcome {
        self.lock(
            ToolbarType::Section,
            Some(ToolbarTarget::section(section_id)),
            format!("section-change:{section_id}"),
            now,
        )
    }

    fn lock(
        &mut self,
        toolbar: ToolbarType,
        target: Option<ToolbarTarget>,
        reason: String,
        now: Timestamp,
    ) -> LockOutcome {
        if let Some(last) = &self.last_trigger {
            let repeated = last.toolbar == toolbar && last.reason == reason;
            if repeated && now.saturating_sub(last.at) < self.config.debounce_ms {
                debug!(reason = %reason, "Debounced repeated transition");
                return LockOutcome::Debounced;
            }
        }

        let expires_at = now + self.config.lock_duration_ms;
        info!(
            toolbar = %toolbar,
            reason = %reason,
            duration_ms = self.config.lock_duration_ms,
            "Transition lock started"
        );

        self.last_trigger = Some(LastTrigger {
            toolbar,
            reason: reason.clone(),
            at: now,
        });
        self.current = Some(TransitionLock {
            toolbar,
            target,
            reason,
            expires_at,
        });

        LockOutcome::Started { expires_at }
    }

    /// Drop the lock immediately
    pub fn unlock(&mut self) {
        if let Some(lock) = self.current.take() {
            debug!(reason = %lock.reason, "Transition lock released");
        }
    }

    /// Clear an expired lock. Returns whether one expired.
    pub fn expire_if_due(&mut self, now: Timestamp) -> bool {
        match &self.current {
            Some(lock) if now >= lock.expires_at => {
                info!(reason = %lock.reason, "Transition lock expired");
                self.current = None;
                true
            }
            _ => false,
        }
    }

    fn active(&self, now: Timestamp) -> Option<&TransitionLock> {
        self.current.as_ref().filter(|lock| now < lock.expires_at)
    }

    pub fn is_locked(&self, now: Timestamp) -> bool {
        self.active(now).is_some()
    }

    pub fn state(&self, now: Timestamp) -> LockState {
        match self.active(now) {
            Some(lock) => LockState {
                is_locked: true,
                locked_toolbar: Some(lock.toolbar),
                locked_target: lock.target.clone(),
                lock_reason: Some(lock.reason.clone()),
                time_remaining_ms: lock.expires_at - now,
            },
            None => LockState::default(),
        }
    }

    /// Toolbar to report: the locked one while locked, else the natural one
    pub fn effective_toolbar(
        &self,
        natural: Option<ToolbarType>,
        now: Timestamp,
    ) -> Option<ToolbarType> {
        match self.active(now) {
            Some(lock) => Some(lock.toolbar),
            None => natural,
        }
    }

    /// Lock-aware visibility for one toolbar type
    pub fn should_render(&self, toolbar: ToolbarType, naturally_visible: bool, now: Timestamp) -> bool {
        match self.active(now) {
            Some(lock) => lock.toolbar == toolbar,
            None => naturally_visible,
        }
    }

    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.current.as_ref().map(|lock| lock.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransitionLockManager {
        TransitionLockManager::new(LockConfig::default())
    }

    #[test]
    fn test_unlocked_by_default() {
        let locks = manager();
        assert!(!locks.is_locked(0));
        assert_eq!(locks.state(0), LockState::default());
        assert_eq!(
            locks.effective_toolbar(Some(ToolbarType::Section), 0),
            Some(ToolbarType::Section)
        );
    }

    #[test]
    fn test_lock_absorbs_natural_changes_until_expiry() {
        let mut locks = manager();
        let hero = ElementRef::new("hero", "headline");

        let outcome = locks.lock_for_element_change(&hero, ToolbarType::Element, 1000);
        assert_eq!(outcome, LockOutcome::Started { expires_at: 1350 });

        // Brief deselect during the click burst.
        assert_eq!(locks.effective_toolbar(None, 1100), Some(ToolbarType::Element));
        assert_eq!(
            locks.effective_toolbar(Some(ToolbarType::Section), 1349),
            Some(ToolbarType::Element)
        );
        assert!(locks.should_render(ToolbarType::Element, false, 1200));
        assert!(!locks.should_render(ToolbarType::Section, true, 1200));

        // Expired: natural resolution wins again.
        assert_eq!(
            locks.effective_toolbar(Some(ToolbarType::Section), 1350),
            Some(ToolbarType::Section)
        );
        assert!(locks.expire_if_due(1350));
        assert!(!locks.expire_if_due(1400));
    }

    #[test]
    fn test_state_reports_time_remaining_and_target() {
        let mut locks = manager();
        locks.lock_for_section_change("pricing", 0);

        let state = locks.state(100);
        assert!(state.is_locked);
        assert_eq!(state.locked_toolbar, Some(ToolbarType::Section));
        assert_eq!(state.locked_target, Some(ToolbarTarget::section("pricing")));
        assert_eq!(state.lock_reason.as_deref(), Some("section-change:pricing"));
        assert_eq!(state.time_remaining_ms, 250);
    }

    #[test]
    fn test_identical_transition_is_debounced() {
        let mut locks = manager();
        let hero = ElementRef::new("hero", "headline");

        locks.lock_for_element_change(&hero, ToolbarType::Element, 0);
        assert_eq!(
            locks.lock_for_element_change(&hero, ToolbarType::Element, 100),
            LockOutcome::Debounced
        );
        // Debounce did not extend the lock.
        assert_eq!(locks.next_expiry(), Some(350));

        // Past the debounce window the same transition restarts the lock.
        assert_eq!(
            locks.lock_for_element_change(&hero, ToolbarType::Element, 200),
            LockOutcome::Started { expires_at: 550 }
        );
    }

    #[test]
    fn test_new_transition_supersedes_pending_lock() {
        let mut locks = manager();
        locks.lock_for_element_change(&ElementRef::new("hero", "headline"), ToolbarType::Element, 0);
        locks.lock_for_element_change(&ElementRef::new("hero", "image"), ToolbarType::Image, 50);

        let state = locks.state(60);
        assert_eq!(state.locked_toolbar, Some(ToolbarType::Image));
        assert_eq!(locks.next_expiry(), Some(400));
    }

    #[test]
    fn test_text_editing_end_returns_to_element_toolbar() {
        let mut locks = manager();
        let hero = ElementRef::new("hero", "headline");

        locks.lock_for_text_editing(true, Some(&hero), 0);
        assert_eq!(locks.state(10).locked_toolbar, Some(ToolbarType::Text));

        locks.lock_for_text_editing(false, Some(&hero), 500);
        let state = locks.state(510);
        assert_eq!(state.locked_toolbar, Some(ToolbarType::Element));
        assert_eq!(state.locked_target, Some(ToolbarTarget::from(&hero)));

        assert_eq!(
            locks.lock_for_text_editing(false, None, 520),
            LockOutcome::Released
        );
        assert!(!locks.is_locked(520));
    }
}
