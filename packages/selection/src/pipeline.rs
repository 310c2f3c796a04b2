//! # Selection Pipeline
//!
//! Runs one resolution cycle: Resolve → Detect transition → Lock → Report
//!
//! The pipeline keeps the previous canonical selection so it can tell which
//! transition (if any) a new editor snapshot represents. It never looks at
//! anchors; placement happens downstream in the session.

use crate::clock::Timestamp;
use crate::config::LockConfig;
use crate::resolver::{
    EditorSelection, EditorSnapshot, ElementRef, Mode, SelectionResolver, ToolbarTarget,
    ToolbarType,
};
use crate::transition_lock::{LockOutcome, LockState, TransitionLockManager};
use serde::Serialize;
use tracing::debug;

/// A selection change that deserves a transition lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Transition {
    #[serde(rename_all = "camelCase")]
    TextEditing {
        is_editing: bool,
        target: Option<ElementRef>,
    },
    #[serde(rename_all = "camelCase")]
    ElementChange {
        element: ElementRef,
        toolbar: ToolbarType,
    },
    #[serde(rename_all = "camelCase")]
    SectionChange { section_id: String },
}

/// Compare two consecutive selections, most significant change first
///
/// 1. Text editing started or stopped
/// 2. A different element got selected (outside text editing)
/// 3. A different section got selected with no element
pub fn detect_transition(prev: &EditorSelection, current: &EditorSelection) -> Option<Transition> {
    if prev.is_text_editing != current.is_text_editing {
        // Once editing stops the resolver no longer reports a target.
        let target = current
            .text_editing_target
            .clone()
            .or_else(|| prev.text_editing_target.clone());
        return Some(Transition::TextEditing {
            is_editing: current.is_text_editing,
            target,
        });
    }

    if current.is_text_editing {
        return None;
    }

    if let Some(element) = &current.selected_element {
        if prev.selected_element.as_ref() != Some(element) {
            let toolbar = match current.toolbar_type_hint {
                Some(hint) if hint != ToolbarType::Text => hint,
                _ => ToolbarType::Element,
            };
            return Some(Transition::ElementChange {
                element: element.clone(),
                toolbar,
            });
        }
        return None;
    }

    match &current.selected_section {
        Some(section) if prev.selected_section.as_ref() != Some(section) => {
            Some(Transition::SectionChange {
                section_id: section.clone(),
            })
        }
        _ => None,
    }
}

/// Outcome of one cycle as seen by the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub selection: EditorSelection,

    /// What the resolver alone would show
    pub natural_toolbar: Option<ToolbarType>,

    /// What to show after the transition lock is applied
    pub active_toolbar: Option<ToolbarType>,

    /// Element or section the active toolbar points at
    pub target: Option<ToolbarTarget>,

    pub lock: LockState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

/// Result of feeding one snapshot through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub resolution: Resolution,

    /// What the lock manager did with the detected transition
    pub lock_outcome: Option<LockOutcome>,
}

#[derive(Debug)]
pub struct SelectionPipeline {
    resolver: SelectionResolver,
    locks: TransitionLockManager,
    previous: EditorSelection,
}

impl SelectionPipeline {
    pub fn new(config: LockConfig) -> Self {
        Self {
            resolver: SelectionResolver::new(),
            locks: TransitionLockManager::new(config),
            previous: EditorSelection::default(),
        }
    }

    /// Feed a new editor snapshot
    pub fn run(&mut self, raw: &EditorSnapshot, now: Timestamp) -> PipelineResult {
        // 1. Canonicalize
        let selection = self.resolver.resolve(raw);

        // 2. Detect and lock; preview mode has no toolbars to protect
        let (transition, lock_outcome) = if selection.mode == Mode::Preview {
            self.locks.unlock();
            (None, Some(LockOutcome::Released))
        } else {
            self.locks.expire_if_due(now);
            let transition = detect_transition(&self.previous, &selection);
            let outcome = transition.as_ref().map(|t| self.apply(t, now));
            (transition, outcome)
        };

        // 3. Remember for the next cycle
        self.previous = selection;

        let mut resolution = self.resolve_at(now);
        resolution.transition = transition;

        debug!(
            natural = ?resolution.natural_toolbar,
            active = ?resolution.active_toolbar,
            locked = resolution.lock.is_locked,
            "Resolved selection"
        );

        PipelineResult {
            resolution,
            lock_outcome,
        }
    }

    fn apply(&mut self, transition: &Transition, now: Timestamp) -> LockOutcome {
        match transition {
            Transition::TextEditing { is_editing, target } => {
                self.locks
                    .lock_for_text_editing(*is_editing, target.as_ref(), now)
            }
            Transition::ElementChange { element, toolbar } => {
                self.locks.lock_for_element_change(element, *toolbar, now)
            }
            Transition::SectionChange { section_id } => {
                self.locks.lock_for_section_change(section_id, now)
            }
        }
    }

    /// Re-evaluate the last selection at `now` without a new snapshot
    pub fn resolve_at(&self, now: Timestamp) -> Resolution {
        let selection = &self.previous;
        let natural_toolbar = self.resolver.active_toolbar(selection);
        let active_toolbar = self.locks.effective_toolbar(natural_toolbar, now);
        let lock = self.locks.state(now);

        let target = match &lock.locked_target {
            Some(target) if lock.is_locked => Some(target.clone()),
            _ => self.resolver.toolbar_target(selection),
        };

        Resolution {
            selection: selection.clone(),
            natural_toolbar,
            active_toolbar,
            target,
            lock,
            transition: None,
        }
    }

    pub fn current(&self) -> &EditorSelection {
        &self.previous
    }

    pub fn resolver(&self) -> &SelectionResolver {
        &self.resolver
    }

    pub fn locks(&self) -> &TransitionLockManager {
        &self.locks
    }

    pub fn locks_mut(&mut self) -> &mut TransitionLockManager {
        &mut self.locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(section: &str, key: &str) -> EditorSnapshot {
        EditorSnapshot {
            selected_element: Some(ElementRef::new(section, key)),
            selected_section: Some(section.to_string()),
            ..EditorSnapshot::default()
        }
    }

    fn section(id: &str) -> EditorSnapshot {
        EditorSnapshot {
            selected_section: Some(id.to_string()),
            ..EditorSnapshot::default()
        }
    }

    fn resolve(raw: &EditorSnapshot) -> EditorSelection {
        SelectionResolver::new().resolve(raw)
    }

    #[test]
    fn test_detects_element_change() {
        let prev = resolve(&section("hero"));
        let current = resolve(&element("hero", "headline"));

        assert_eq!(
            detect_transition(&prev, &current),
            Some(Transition::ElementChange {
                element: ElementRef::new("hero", "headline"),
                toolbar: ToolbarType::Element,
            })
        );
        assert_eq!(detect_transition(&current, &current), None);
    }

    #[test]
    fn test_text_editing_change_wins() {
        let prev = resolve(&element("hero", "headline"));
        let current = resolve(&EditorSnapshot {
            is_text_editing: true,
            text_editing_element: Some(ElementRef::new("hero", "headline")),
            ..element("hero", "cta")
        });

        assert_eq!(
            detect_transition(&prev, &current),
            Some(Transition::TextEditing {
                is_editing: true,
                target: Some(ElementRef::new("hero", "headline")),
            })
        );

        // Stopping remembers what was being edited.
        let stopped = resolve(&element("hero", "headline"));
        assert_eq!(
            detect_transition(&current, &stopped),
            Some(Transition::TextEditing {
                is_editing: false,
                target: Some(ElementRef::new("hero", "headline")),
            })
        );
    }

    #[test]
    fn test_section_change_needs_no_element() {
        let prev = resolve(&section("hero"));
        assert_eq!(
            detect_transition(&prev, &resolve(&section("pricing"))),
            Some(Transition::SectionChange {
                section_id: "pricing".to_string()
            })
        );

        // Deselecting everything is not a transition.
        assert_eq!(detect_transition(&prev, &resolve(&EditorSnapshot::default())), None);
    }

    #[test]
    fn test_hint_picks_element_change_toolbar() {
        let prev = EditorSelection::default();
        let current = resolve(&EditorSnapshot {
            toolbar: Some(ToolbarType::Image),
            ..element("gallery", "cover")
        });

        assert!(matches!(
            detect_transition(&prev, &current),
            Some(Transition::ElementChange {
                toolbar: ToolbarType::Image,
                ..
            })
        ));
    }

    #[test]
    fn test_lock_holds_element_toolbar_through_deselect() {
        let mut pipeline = SelectionPipeline::new(LockConfig::default());

        let first = pipeline.run(&element("hero", "headline"), 0);
        assert_eq!(first.lock_outcome, Some(LockOutcome::Started { expires_at: 350 }));
        assert_eq!(first.resolution.active_toolbar, Some(ToolbarType::Element));

        // Click burst: the editor briefly reports nothing selected.
        let blip = pipeline.run(&EditorSnapshot::default(), 30);
        assert_eq!(blip.resolution.natural_toolbar, None);
        assert_eq!(blip.resolution.active_toolbar, Some(ToolbarType::Element));
        assert_eq!(
            blip.resolution.target,
            Some(ToolbarTarget::from(&ElementRef::new("hero", "headline")))
        );

        let settled = pipeline.resolve_at(400);
        assert_eq!(settled.active_toolbar, None);
        assert!(!settled.lock.is_locked);
    }

    #[test]
    fn test_preview_mode_releases_lock() {
        let mut pipeline = SelectionPipeline::new(LockConfig::default());
        pipeline.run(&element("hero", "headline"), 0);

        let preview = pipeline.run(
            &EditorSnapshot {
                mode: Mode::Preview,
                ..element("hero", "headline")
            },
            10,
        );
        assert_eq!(preview.resolution.active_toolbar, None);
        assert!(!preview.resolution.lock.is_locked);
    }
}
