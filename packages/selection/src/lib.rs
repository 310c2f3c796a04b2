//! # Pagebuilder Selection
//!
//! Decides which single contextual toolbar the page builder canvas shows,
//! where it goes, and keeps it from flickering while a click settles.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ editor store: EditorSnapshot per change     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ pipeline                                    │
//! │  - SelectionResolver: priority resolution   │
//! │  - transition detection vs last selection   │
//! │  - TransitionLockManager: anti-flicker lock │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ AnchorRegistry: target rect → position      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//!              ToolbarVisibility
//!
//!   StabilityGuard sits beside the pipeline and rate-limits
//!   selection-handler attachment in the DOM layer.
//! ```
//!
//! ## Core Principles
//!
//! 1. **One toolbar at a time**: text > hint > element > section
//! 2. **Locks beat resolution**: during a transition the locked toolbar wins
//! 3. **No anchor, no toolbar**: an unmeasurable target hides the toolbar
//! 4. **Explicit time**: one clock and one timer queue per session
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagebuilder_selection::{
//!     DetachableTarget, EditorSnapshot, ElementRef, EngineConfig, Rect, SelectionSession,
//!     ToolbarType,
//! };
//!
//! let mut session = SelectionSession::new("canvas", EngineConfig::default());
//!
//! session.register_anchor(
//!     "element:hero.headline".parse()?,
//!     Box::new(DetachableTarget::new(Rect::new(100.0, 100.0, 400.0, 60.0))),
//! );
//!
//! session.update(&EditorSnapshot {
//!     selected_element: Some(ElementRef::new("hero", "headline")),
//!     selected_section: Some("hero".to_string()),
//!     ..Default::default()
//! });
//!
//! let element = session.toolbar_visibility(ToolbarType::Element, None);
//! assert!(element.is_visible);
//! ```

mod anchors;
mod clock;
mod config;
mod diagnostics;
mod errors;
mod geometry;
mod pipeline;
mod resolver;
mod session;
mod stability;
mod timers;
mod transition_lock;

pub use anchors::{
    Anchor, AnchorKey, AnchorRegistry, AnchorTarget, DetachableTarget, DEFAULT_VIEWPORT,
};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{
    AnchorConfig, DiagnosticsConfig, EngineConfig, LockConfig, StabilityConfig,
    DEFAULT_CONFIG_NAME,
};
pub use diagnostics::{
    AnchorDiagnosis, AnchorSummary, DiagnosticEvent, DiagnosticLog, DiagnosticReport, Level,
    Phase, SelectionDiagnosis, ToolbarCheck, Verdict,
};
pub use errors::EngineError;
pub use geometry::{
    place_toolbar, Arrow, ArrowSide, Placement, PlacementMetrics, Rect, Size, ToolbarPosition,
};
pub use pipeline::{detect_transition, PipelineResult, Resolution, SelectionPipeline, Transition};
pub use resolver::{
    EditorSelection, EditorSnapshot, ElementRef, Mode, SelectionResolver, ToolbarTarget,
    ToolbarType,
};
pub use session::{SelectionSession, ToolbarVisibility};
pub use stability::{AttachOutcome, GuardPhase, StabilityGuard, StabilityStats};
pub use timers::{TimerKind, TimerQueue};
pub use transition_lock::{LockOutcome, LockState, TransitionLockManager};
