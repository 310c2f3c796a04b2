//! # Selection Session
//!
//! One session per editor canvas. It owns every piece of arbitration state
//! (pipeline, anchors, stability guard, timers) so nothing is global, and it
//! reads its clock once per call.
//!
//! The host drives it with three kinds of input:
//! - `update(snapshot)` whenever the editor store changes
//! - DOM events: anchor registration, `on_scroll`, `on_resize`
//! - `tick()` whenever `next_deadline()` has passed

use crate::anchors::{Anchor, AnchorKey, AnchorRegistry, AnchorTarget};
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::EngineConfig;
use crate::diagnostics::{
    diagnose_anchors, DiagnosticLog, DiagnosticReport, Phase, SelectionDiagnosis, ToolbarCheck,
    Verdict, RECENT_EVENTS,
};
use crate::geometry::{Size, ToolbarPosition};
use crate::pipeline::{Resolution, SelectionPipeline};
use crate::resolver::{EditorSelection, EditorSnapshot, ToolbarType};
use crate::stability::{AttachOutcome, StabilityGuard, StabilityStats};
use crate::timers::{TimerKind, TimerQueue};
use crate::transition_lock::{LockOutcome, LockState};
use serde::Serialize;
use tracing::{debug, info};

/// Everything the presentation layer needs to render one toolbar type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarVisibility {
    pub toolbar: ToolbarType,
    pub is_visible: bool,
    pub active_toolbar: Option<ToolbarType>,
    pub natural_toolbar: Option<ToolbarType>,

    /// `None` while visible means no usable anchor: do not render
    pub position: Option<ToolbarPosition>,

    pub is_transition_locked: bool,
    pub lock_reason: Option<String>,

    /// Human-readable explanation, for debugging only
    pub reason: String,
}

#[derive(Debug)]
pub struct SelectionSession {
    /// Unique session identifier
    pub id: String,

    config: EngineConfig,
    clock: Box<dyn Clock>,
    timers: TimerQueue,
    pipeline: SelectionPipeline,
    anchors: AnchorRegistry,
    stability: StabilityGuard,
    diagnostics: DiagnosticLog,
}

impl SelectionSession {
    /// Create a session on the monotonic system clock
    pub fn new(id: impl Into<String>, config: EngineConfig) -> Self {
        Self::with_clock(id, config, Box::new(SystemClock::new()))
    }

    pub fn with_clock(id: impl Into<String>, config: EngineConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            id: id.into(),
            timers: TimerQueue::new(),
            pipeline: SelectionPipeline::new(config.lock.clone()),
            anchors: AnchorRegistry::new(config.anchors.clone()),
            stability: StabilityGuard::new(config.stability.clone()),
            diagnostics: DiagnosticLog::new(config.diagnostics.max_events),
            clock,
            config,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Feed the latest editor state and get the arbitrated result
    pub fn update(&mut self, raw: &EditorSnapshot) -> Resolution {
        let now = self.now();
        self.fire_due(now);

        let result = self.pipeline.run(raw, now);

        match result.lock_outcome {
            Some(LockOutcome::Started { expires_at }) => {
                self.timers.schedule(TimerKind::LockExpiry, expires_at);
                if let Some(reason) = &result.resolution.lock.lock_reason {
                    self.diagnostics
                        .info(now, Phase::Lock, format!("Lock started: {reason}"));
                }
            }
            Some(LockOutcome::Released) => {
                self.timers.cancel(&TimerKind::LockExpiry);
            }
            Some(LockOutcome::Debounced) | None => {}
        }

        let resolution = result.resolution;
        self.diagnostics.info(
            now,
            Phase::Selection,
            format!(
                "Resolved: natural={}, active={}",
                toolbar_name(resolution.natural_toolbar),
                toolbar_name(resolution.active_toolbar)
            ),
        );
        resolution
    }

    /// Current arbitration result without a new snapshot
    pub fn resolution(&self) -> Resolution {
        self.pipeline.resolve_at(self.now())
    }

    pub fn current(&self) -> &EditorSelection {
        self.pipeline.current()
    }

    pub fn lock_state(&self) -> LockState {
        self.pipeline.locks().state(self.now())
    }

    /// Visibility, position and reason for one toolbar type
    ///
    /// `toolbar_size` is the measured toolbar size; the per-type default
    /// is used until the toolbar has been rendered once.
    pub fn toolbar_visibility(
        &mut self,
        toolbar: ToolbarType,
        toolbar_size: Option<Size>,
    ) -> ToolbarVisibility {
        let now = self.now();
        let resolution = self.pipeline.resolve_at(now);
        let locks = self.pipeline.locks();

        let naturally_visible = resolution.natural_toolbar == Some(toolbar);
        let is_visible = locks.should_render(toolbar, naturally_visible, now);
        let lock = resolution.lock;

        let position = match (&resolution.target, is_visible) {
            (Some(target), true) => {
                let key = AnchorKey::for_target(toolbar, target);
                let size = toolbar_size.unwrap_or_else(|| toolbar.default_size());
                let position = self.anchors.calculate_toolbar_position(&key, size, now);
                if position.is_none() {
                    debug!(key = %key, "No anchor for visible toolbar");
                }
                position
            }
            _ => None,
        };

        let mut reason = match (lock.is_locked, is_visible) {
            (true, true) => format!(
                "{toolbar} toolbar locked visible ({})",
                lock.lock_reason.as_deref().unwrap_or("transition")
            ),
            (true, false) => format!(
                "{toolbar} toolbar locked hidden ({} is locked)",
                toolbar_name(lock.locked_toolbar)
            ),
            (false, true) => format!("{toolbar} toolbar naturally active"),
            (false, false) => format!(
                "{} toolbar has natural priority",
                toolbar_name(resolution.natural_toolbar)
            ),
        };
        if is_visible {
            reason.push_str(match position {
                Some(_) => " with anchor positioning",
                None => " (no anchor registered)",
            });
        }

        if is_visible && position.is_none() {
            self.diagnostics
                .warn(now, Phase::Render, format!("{toolbar} toolbar visible without anchor"));
        }

        ToolbarVisibility {
            toolbar,
            is_visible,
            active_toolbar: resolution.active_toolbar,
            natural_toolbar: resolution.natural_toolbar,
            position,
            is_transition_locked: lock.is_locked,
            lock_reason: lock.lock_reason,
            reason,
        }
    }

    /// Visibility of whichever toolbar is active, if any
    pub fn active_visibility(&mut self, toolbar_size: Option<Size>) -> Option<ToolbarVisibility> {
        let active = self.pipeline.resolve_at(self.now()).active_toolbar?;
        Some(self.toolbar_visibility(active, toolbar_size))
    }

    pub fn register_anchor(&mut self, key: AnchorKey, target: Box<dyn AnchorTarget>) -> bool {
        let now = self.now();
        let label = key.to_string();
        let registered = self.anchors.register_anchor(key, target, now);

        if registered {
            self.diagnostics
                .info(now, Phase::Anchor, format!("Registered anchor {label}"));
            if !self.timers.is_scheduled(&TimerKind::AnchorSweep) {
                self.timers.schedule(
                    TimerKind::AnchorSweep,
                    now + self.config.anchors.sweep_interval_ms,
                );
            }
        } else {
            self.diagnostics
                .warn(now, Phase::Anchor, format!("Anchor {label} not measurable"));
        }
        registered
    }

    pub fn unregister_anchor(&mut self, key: &AnchorKey) -> bool {
        let now = self.now();
        let removed = self.anchors.unregister_anchor(key);
        if removed {
            self.diagnostics
                .info(now, Phase::Anchor, format!("Unregistered anchor {key}"));
        }
        removed
    }

    pub fn get_anchor_by_selection(
        &mut self,
        toolbar: ToolbarType,
        section_id: &str,
        element_key: Option<&str>,
    ) -> Option<Anchor> {
        let now = self.now();
        self.anchors
            .get_anchor_by_selection(toolbar, section_id, element_key, now)
    }

    pub fn calculate_toolbar_position(
        &mut self,
        key: &AnchorKey,
        toolbar_size: Size,
    ) -> Option<ToolbarPosition> {
        let now = self.now();
        self.anchors.calculate_toolbar_position(key, toolbar_size, now)
    }

    /// Re-measure the active toolbar's anchor after a scroll
    pub fn on_scroll(&mut self) -> Option<ToolbarVisibility> {
        self.active_visibility(None)
    }

    pub fn on_resize(&mut self, viewport: Size) -> Option<ToolbarVisibility> {
        debug!(width = viewport.width, height = viewport.height, "Viewport resized");
        self.anchors.set_viewport(viewport);
        self.active_visibility(None)
    }

    pub fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    /// Ask the stability guard whether handler `id` may attach now
    pub fn attempt_attach(&mut self, id: &str, owner: Option<&str>) -> bool {
        let now = self.now();
        let retry = TimerKind::StabilityRetry(id.to_string());

        match self.stability.attempt_attach(id, owner, now) {
            AttachOutcome::Allowed => {
                self.timers.cancel(&retry);
                true
            }
            AttachOutcome::Blocked => false,
            AttachOutcome::Froze { retry_at } => {
                self.timers.schedule(retry, retry_at);
                self.diagnostics.error(
                    now,
                    Phase::Stability,
                    format!("Handler {id} thrashing, frozen until retry at {retry_at}"),
                );
                false
            }
        }
    }

    pub fn attempt_detach(&mut self, id: &str, owner: Option<&str>) {
        let now = self.now();
        self.stability.attempt_detach(id, owner, now);
    }

    pub fn is_frozen(&mut self, id: &str) -> bool {
        let now = self.now();
        let frozen = self.stability.is_frozen(id, now);
        if !frozen {
            self.timers.cancel(&TimerKind::StabilityRetry(id.to_string()));
        }
        frozen
    }

    pub fn manual_unfreeze(&mut self, id: &str) -> bool {
        let now = self.now();
        self.timers.cancel(&TimerKind::StabilityRetry(id.to_string()));
        let unfrozen = self.stability.manual_unfreeze(id, now);
        if unfrozen {
            self.diagnostics
                .info(now, Phase::Stability, format!("Handler {id} manually unfrozen"));
        }
        unfrozen
    }

    pub fn stability_stats(&self, id: &str) -> Option<StabilityStats> {
        self.stability.stats(id, self.now())
    }

    pub fn all_stability_stats(&self) -> Vec<StabilityStats> {
        self.stability.all_stats(self.now())
    }

    /// Forget every handler id and cancel pending retries
    pub fn reset_stability(&mut self) {
        self.stability.reset();
        self.timers
            .cancel_where(|kind| matches!(kind, TimerKind::StabilityRetry(_)));
    }

    /// Fire every timer that is due; returns what fired
    pub fn tick(&mut self) -> Vec<TimerKind> {
        let now = self.now();
        self.fire_due(now)
    }

    /// Earliest pending deadline, for arming one host timer
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    /// Pending timers with their deadlines, earliest first
    pub fn pending_timers(&self) -> Vec<(Timestamp, TimerKind)> {
        self.timers.pending()
    }

    fn fire_due(&mut self, now: Timestamp) -> Vec<TimerKind> {
        let fired = self.timers.drain_due(now);

        for kind in &fired {
            match kind {
                TimerKind::LockExpiry => {
                    if self.pipeline.locks_mut().expire_if_due(now) {
                        self.diagnostics.info(now, Phase::Lock, "Lock expired");
                    }
                }
                TimerKind::StabilityRetry(id) => {
                    if self.stability.auto_retry(id, now) {
                        self.diagnostics
                            .info(now, Phase::Stability, format!("Handler {id} auto-unfrozen"));
                    }
                }
                TimerKind::AnchorSweep => {
                    let evicted = self.anchors.sweep_stale(now);
                    for key in &evicted {
                        self.diagnostics
                            .info(now, Phase::Anchor, format!("Evicted stale anchor {key}"));
                    }
                    if !evicted.is_empty() {
                        info!(count = evicted.len(), "Swept stale anchors");
                    }
                    if self.anchors.anchor_count() > 0 {
                        self.timers.schedule(
                            TimerKind::AnchorSweep,
                            now + self.config.anchors.sweep_interval_ms,
                        );
                    }
                }
            }
        }

        fired
    }

    /// Explain the current arbitration state
    pub fn diagnostic_report(&self) -> DiagnosticReport {
        let now = self.now();
        let resolution = self.pipeline.resolve_at(now);
        let resolver = self.pipeline.resolver();

        let toolbars = ToolbarType::ALL
            .into_iter()
            .map(|toolbar| ToolbarCheck {
                toolbar,
                should_show: resolver.should_show(toolbar, &resolution.selection),
            })
            .collect();

        let anchors = diagnose_anchors(
            &self.anchors.inspect(),
            now,
            self.config.anchors.stale_timeout_ms,
        );

        let active_key = match (resolution.active_toolbar, &resolution.target) {
            (Some(toolbar), Some(target)) => Some(AnchorKey::for_target(toolbar, target)),
            _ => None,
        };

        let selection = SelectionDiagnosis {
            selection: resolution.selection,
            natural_toolbar: resolution.natural_toolbar,
            active_toolbar: resolution.active_toolbar,
            lock: resolution.lock,
            toolbars,
        };
        let verdict = Verdict::evaluate(&selection, &anchors, active_key.as_ref());

        DiagnosticReport {
            generated_at: now,
            anchors,
            selection,
            recent_events: self.diagnostics.recent(RECENT_EVENTS),
            verdict,
        }
    }
}

fn toolbar_name(toolbar: Option<ToolbarType>) -> &'static str {
    toolbar.map_or("no", |t| t.as_str())
}
