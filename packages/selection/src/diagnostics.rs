//! In-session diagnostics
//!
//! A bounded event log kept next to the `tracing` output, plus a report that
//! explains why a toolbar is (not) on screen.

use crate::anchors::{Anchor, AnchorKey};
use crate::clock::Timestamp;
use crate::geometry::Rect;
use crate::resolver::{EditorSelection, Mode, ToolbarType};
use crate::transition_lock::LockState;
use serde::Serialize;
use std::collections::VecDeque;

/// Number of events included in a report
pub const RECENT_EVENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Selection,
    Lock,
    Anchor,
    Stability,
    Render,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEvent {
    pub timestamp: Timestamp,
    pub phase: Phase,
    pub level: Level,
    pub message: String,
}

/// Ring buffer of the most recent events
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    max_events: usize,
    events: VecDeque<DiagnosticEvent>,
}

impl DiagnosticLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            events: VecDeque::with_capacity(max_events.min(1024)),
        }
    }

    pub fn record(
        &mut self,
        timestamp: Timestamp,
        phase: Phase,
        level: Level,
        message: impl Into<String>,
    ) {
        if self.max_events == 0 {
            return;
        }
        while self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(DiagnosticEvent {
            timestamp,
            phase,
            level,
            message: message.into(),
        });
    }

    pub fn info(&mut self, timestamp: Timestamp, phase: Phase, message: impl Into<String>) {
        self.record(timestamp, phase, Level::Info, message);
    }

    pub fn warn(&mut self, timestamp: Timestamp, phase: Phase, message: impl Into<String>) {
        self.record(timestamp, phase, Level::Warn, message);
    }

    pub fn error(&mut self, timestamp: Timestamp, phase: Phase, message: impl Into<String>) {
        self.record(timestamp, phase, Level::Error, message);
    }

    /// Up to `n` newest events, oldest first
    pub fn recent(&self, n: usize) -> Vec<DiagnosticEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorDiagnosis {
    pub key: AnchorKey,
    pub rect: Rect,
    pub age_ms: u64,
    pub is_attached: bool,
    pub is_stale: bool,
}

impl AnchorDiagnosis {
    pub fn is_valid(&self) -> bool {
        self.is_attached && !self.is_stale && !self.rect.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorSummary {
    pub summary: String,
    pub details: Vec<AnchorDiagnosis>,
    pub recommendations: Vec<String>,
}

/// Classify anchors as returned by `AnchorRegistry::inspect`
pub fn diagnose_anchors(
    anchors: &[(Anchor, bool)],
    now: Timestamp,
    stale_timeout_ms: u64,
) -> AnchorSummary {
    let details: Vec<AnchorDiagnosis> = anchors
        .iter()
        .map(|(anchor, is_attached)| {
            let age_ms = now.saturating_sub(anchor.last_seen_at);
            AnchorDiagnosis {
                key: anchor.key.clone(),
                rect: anchor.target_rect,
                age_ms,
                is_attached: *is_attached,
                is_stale: age_ms > stale_timeout_ms,
            }
        })
        .collect();

    let valid = details.iter().filter(|d| d.is_valid()).count();
    let stale = details.iter().filter(|d| d.is_stale).count();
    let detached = details.iter().filter(|d| !d.is_attached).count();

    let mut recommendations = Vec::new();
    if details.is_empty() {
        recommendations.push("No anchors registered; check toolbar anchor registration".to_string());
    }
    if stale > 0 {
        recommendations.push(format!("{stale} stale anchors found; sweep pending"));
    }
    if detached > 0 {
        recommendations.push(format!(
            "{detached} anchors lost their target; check that toolbars unregister on unmount"
        ));
    }

    AnchorSummary {
        summary: format!("{valid}/{} anchors valid, {stale} stale", details.len()),
        details,
        recommendations,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarCheck {
    pub toolbar: ToolbarType,
    pub should_show: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionDiagnosis {
    pub selection: EditorSelection,
    pub natural_toolbar: Option<ToolbarType>,
    pub active_toolbar: Option<ToolbarType>,
    pub lock: LockState,
    pub toolbars: Vec<ToolbarCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub can_show_toolbar: bool,
    pub blocking_factors: Vec<String>,
}

impl Verdict {
    /// `active_key` is the anchor the active toolbar would use, if any
    pub fn evaluate(
        selection: &SelectionDiagnosis,
        anchors: &AnchorSummary,
        active_key: Option<&AnchorKey>,
    ) -> Self {
        let mut blocking_factors = Vec::new();
        let sel = &selection.selection;

        if sel.mode != Mode::Edit {
            blocking_factors.push("Mode is 'preview', not 'edit'".to_string());
        }
        if sel.selected_element.is_none()
            && sel.selected_section.is_none()
            && sel.text_editing_target.is_none()
        {
            blocking_factors.push("Nothing is selected".to_string());
        }
        if anchors.details.is_empty() {
            blocking_factors.push("No anchors registered".to_string());
        }
        if let Some(key) = active_key {
            let has_valid = anchors
                .details
                .iter()
                .any(|d| &d.key == key && d.is_valid());
            if !has_valid {
                blocking_factors.push(format!("No valid anchor for '{key}'"));
            }
        }

        let can_show_toolbar = selection.active_toolbar.is_some() && blocking_factors.is_empty();
        Self {
            can_show_toolbar,
            blocking_factors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub generated_at: Timestamp,
    pub anchors: AnchorSummary,
    pub selection: SelectionDiagnosis,
    pub recent_events: Vec<DiagnosticEvent>,
    pub verdict: Verdict,
}
