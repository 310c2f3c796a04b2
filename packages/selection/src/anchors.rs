//! # Anchor Registry
//!
//! Maps `toolbarType:sectionId[.elementKey]` keys to the on-screen element a
//! toolbar should point at. Rectangles are re-measured on every query, so a
//! position is always computed from the latest layout; a target that can no
//! longer be measured is dropped and the query yields `None`.
//!
//! The periodic sweep re-measures every entry. Targets that left the document
//! are evicted at once; targets that stay collapsed to zero size past the
//! staleness window go too, which keeps the map bounded while the user clicks
//! through many elements. A live toolbar target is never evicted for being idle.

use crate::clock::Timestamp;
use crate::config::AnchorConfig;
use crate::errors::EngineError;
use crate::geometry::{place_toolbar, Rect, Size, ToolbarPosition};
use crate::resolver::{ToolbarTarget, ToolbarType};
use serde::Serialize;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, warn};

/// Viewport assumed until the host reports its real size
pub const DEFAULT_VIEWPORT: Size = Size::new(1280.0, 800.0);

/// Something on screen that can be measured
pub trait AnchorTarget: fmt::Debug {
    /// Current bounding rect, or `None` once the element is gone
    fn bounding_rect(&self) -> Option<Rect>;
}

/// Target with a settable rect, for headless drivers and tests
///
/// Clones share state: move or detach through one handle and the registry
/// sees it through the other.
#[derive(Debug, Clone, Default)]
pub struct DetachableTarget {
    rect: Rc<Cell<Option<Rect>>>,
}

impl DetachableTarget {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect: Rc::new(Cell::new(Some(rect))),
        }
    }

    pub fn set_rect(&self, rect: Rect) {
        self.rect.set(Some(rect));
    }

    pub fn detach(&self) {
        self.rect.set(None);
    }

    pub fn is_attached(&self) -> bool {
        self.rect.get().is_some()
    }
}

impl AnchorTarget for DetachableTarget {
    fn bounding_rect(&self) -> Option<Rect> {
        self.rect.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorKey {
    pub toolbar: ToolbarType,
    pub section_id: String,
    pub element_key: Option<String>,
}

impl AnchorKey {
    pub fn new(toolbar: ToolbarType, section_id: impl Into<String>, element_key: Option<&str>) -> Self {
        Self {
            toolbar,
            section_id: section_id.into(),
            element_key: element_key.map(str::to_string),
        }
    }

    pub fn for_target(toolbar: ToolbarType, target: &ToolbarTarget) -> Self {
        Self {
            toolbar,
            section_id: target.section_id.clone(),
            element_key: target.element_key.clone(),
        }
    }
}

impl fmt::Display for AnchorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element_key {
            Some(element) => write!(f, "{}:{}.{}", self.toolbar, self.section_id, element),
            None => write!(f, "{}:{}", self.toolbar, self.section_id),
        }
    }
}

impl FromStr for AnchorKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || EngineError::MalformedAnchorKey(s.to_string());

        let (toolbar, rest) = s.split_once(':').ok_or_else(malformed)?;
        let toolbar: ToolbarType = toolbar.parse()?;
        let (section_id, element_key) = match rest.split_once('.') {
            Some((section, element)) => (section, Some(element)),
            None => (rest, None),
        };

        if section_id.is_empty() || element_key.is_some_and(str::is_empty) {
            return Err(malformed());
        }

        Ok(AnchorKey::new(toolbar, section_id, element_key))
    }
}

impl Serialize for AnchorKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Snapshot of one registered anchor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub key: AnchorKey,
    pub target_rect: Rect,
    pub registered_at: Timestamp,
    pub last_seen_at: Timestamp,
}

#[derive(Debug)]
struct AnchorEntry {
    anchor: Anchor,
    target: Box<dyn AnchorTarget>,
}

impl AnchorEntry {
    /// A collapsed (zero-size) target keeps its old `last_seen_at`
    fn observe(&mut self, rect: Rect, now: Timestamp) {
        self.anchor.target_rect = rect;
        if !rect.is_empty() {
            self.anchor.last_seen_at = now;
        }
    }
}

#[derive(Debug)]
pub struct AnchorRegistry {
    config: AnchorConfig,
    viewport: Size,
    entries: HashMap<AnchorKey, AnchorEntry>,
}

impl AnchorRegistry {
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            viewport: DEFAULT_VIEWPORT,
            entries: HashMap::new(),
        }
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    /// Register (or replace) the target for `key`
    ///
    /// A target that cannot be measured right now is not registered.
    pub fn register_anchor(
        &mut self,
        key: AnchorKey,
        target: Box<dyn AnchorTarget>,
        now: Timestamp,
    ) -> bool {
        let Some(target_rect) = target.bounding_rect() else {
            debug!(key = %key, "Skipping anchor registration for detached target");
            return false;
        };

        debug!(key = %key, "Registering anchor");
        let anchor = Anchor {
            key: key.clone(),
            target_rect,
            registered_at: now,
            last_seen_at: now,
        };
        self.entries.insert(key, AnchorEntry { anchor, target });
        true
    }

    pub fn unregister_anchor(&mut self, key: &AnchorKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Re-measure one anchor, dropping it if its target is gone
    pub fn refresh_anchor(&mut self, key: &AnchorKey, now: Timestamp) -> Option<Anchor> {
        let entry = self.entries.get_mut(key)?;

        match entry.target.bounding_rect() {
            Some(rect) => {
                entry.observe(rect, now);
                Some(entry.anchor.clone())
            }
            None => {
                warn!(key = %key, "Anchor target left the document");
                self.entries.remove(key);
                None
            }
        }
    }

    pub fn get_anchor_by_selection(
        &mut self,
        toolbar: ToolbarType,
        section_id: &str,
        element_key: Option<&str>,
        now: Timestamp,
    ) -> Option<Anchor> {
        let key = AnchorKey::new(toolbar, section_id, element_key);
        self.refresh_anchor(&key, now)
    }

    /// Position a toolbar of `toolbar_size` against the anchor for `key`
    pub fn calculate_toolbar_position(
        &mut self,
        key: &AnchorKey,
        toolbar_size: Size,
        now: Timestamp,
    ) -> Option<ToolbarPosition> {
        let anchor = self.refresh_anchor(key, now)?;
        Some(place_toolbar(
            anchor.target_rect,
            toolbar_size,
            self.viewport,
            self.config.metrics(),
        ))
    }

    /// Re-measure every anchor, then evict those whose target is gone or
    /// has been collapsed for longer than the stale timeout
    pub fn sweep_stale(&mut self, now: Timestamp) -> Vec<AnchorKey> {
        let stale_timeout = self.config.stale_timeout_ms;
        let mut evicted = Vec::new();

        for (key, entry) in self.entries.iter_mut() {
            match entry.target.bounding_rect() {
                Some(rect) => {
                    entry.observe(rect, now);
                    if now.saturating_sub(entry.anchor.last_seen_at) > stale_timeout {
                        evicted.push(key.clone());
                    }
                }
                None => evicted.push(key.clone()),
            }
        }
        evicted.sort();

        for key in &evicted {
            self.entries.remove(key);
            debug!(key = %key, "Evicted stale anchor");
        }

        evicted
    }

    pub fn anchor_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &AnchorKey) -> bool {
        self.entries.contains_key(key)
    }

    /// All anchors with whether their target is still measurable, by key
    pub fn inspect(&self) -> Vec<(Anchor, bool)> {
        let mut anchors: Vec<(Anchor, bool)> = self
            .entries
            .values()
            .map(|entry| (entry.anchor.clone(), entry.target.bounding_rect().is_some()))
            .collect();
        anchors.sort_by(|a, b| a.0.key.cmp(&b.0.key));
        anchors
    }

    pub fn anchors(&self) -> Vec<Anchor> {
        self.inspect().into_iter().map(|(anchor, _)| anchor).collect()
    }
}
