//! # Toolbar Geometry
//!
//! Rectangles in CSS pixels (viewport coordinates, origin top-left) and the
//! placement search that puts a toolbar next to its target.
//!
//! ## Placement
//!
//! Candidates are tried in a fixed order and the first one whose whole box
//! fits inside the viewport wins:
//!
//! ```text
//!            top-left ┌────────┐ top-right
//!                     │ target │ right-top ─▶
//!      ◀─ left-top    └────────┘
//!         bottom-left            bottom-right
//! ```
//!
//! If nothing fits, the toolbar is clamped into the viewport below-left of
//! the target and drawn without an arrow.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Zero-area rects belong to hidden or collapsed elements
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Rect of this size anchored at the origin
    pub fn as_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// Where the toolbar ended up relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
    RightTop,
    LeftTop,
    ViewportClamped,
}

impl Placement {
    /// Search order for the anchored placements
    pub const CANDIDATES: [Placement; 6] = [
        Placement::BottomLeft,
        Placement::BottomRight,
        Placement::TopLeft,
        Placement::TopRight,
        Placement::RightTop,
        Placement::LeftTop,
    ];
}

/// Toolbar edge carrying the arrow indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowSide {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrow {
    pub side: ArrowSide,
    /// Distance along `side` from the toolbar's top-left corner
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolbarPosition {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub placement: Placement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrow: Option<Arrow>,
}

impl ToolbarPosition {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Gap between target and toolbar, and arrow inset from the toolbar corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementMetrics {
    pub spacing: f64,
    pub arrow_offset: f64,
}

/// Pick a position for a toolbar of `toolbar` size next to `target`
pub fn place_toolbar(
    target: Rect,
    toolbar: Size,
    viewport: Size,
    metrics: PlacementMetrics,
) -> ToolbarPosition {
    for placement in Placement::CANDIDATES {
        let Some((x, y, arrow)) = candidate(placement, target, toolbar, metrics) else {
            continue;
        };
        let fits = x >= 0.0
            && x + toolbar.width <= viewport.width
            && y >= 0.0
            && y + toolbar.height <= viewport.height;

        if fits {
            return ToolbarPosition {
                x,
                y,
                width: toolbar.width,
                height: toolbar.height,
                placement,
                arrow: Some(arrow),
            };
        }
    }

    // The arrow would not point at the target edge from a clamped spot.
    let x = clamp_into(target.left, viewport.width - toolbar.width);
    let y = clamp_into(target.bottom() + metrics.spacing, viewport.height - toolbar.height);

    ToolbarPosition {
        x,
        y,
        width: toolbar.width,
        height: toolbar.height,
        placement: Placement::ViewportClamped,
        arrow: None,
    }
}

fn candidate(
    placement: Placement,
    target: Rect,
    toolbar: Size,
    metrics: PlacementMetrics,
) -> Option<(f64, f64, Arrow)> {
    let PlacementMetrics {
        spacing,
        arrow_offset,
    } = metrics;
    let below = target.bottom() + spacing;
    let above = target.top - toolbar.height - spacing;
    let right_aligned = target.right() - toolbar.width;

    let spot = match placement {
        Placement::BottomLeft => (target.left, below, arrow(ArrowSide::Top, arrow_offset)),
        Placement::BottomRight => (
            right_aligned,
            below,
            arrow(ArrowSide::Top, toolbar.width - arrow_offset),
        ),
        Placement::TopLeft => (target.left, above, arrow(ArrowSide::Bottom, arrow_offset)),
        Placement::TopRight => (
            right_aligned,
            above,
            arrow(ArrowSide::Bottom, toolbar.width - arrow_offset),
        ),
        Placement::RightTop => (
            target.right() + spacing,
            target.top,
            arrow(ArrowSide::Left, arrow_offset),
        ),
        Placement::LeftTop => (
            target.left - toolbar.width - spacing,
            target.top,
            arrow(ArrowSide::Right, arrow_offset),
        ),
        Placement::ViewportClamped => return None,
    };
    Some(spot)
}

fn arrow(side: ArrowSide, offset: f64) -> Arrow {
    Arrow { side, offset }
}

/// Clamp into `[0, max]`; the lower bound wins when `max` is negative
fn clamp_into(value: f64, max: f64) -> f64 {
    value.min(max).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRICS: PlacementMetrics = PlacementMetrics {
        spacing: 8.0,
        arrow_offset: 20.0,
    };
    const VIEWPORT: Size = Size::new(1280.0, 800.0);
    const TOOLBAR: Size = Size::new(320.0, 48.0);

    #[test]
    fn test_prefers_bottom_left() {
        let target = Rect::new(100.0, 100.0, 400.0, 60.0);
        let pos = place_toolbar(target, TOOLBAR, VIEWPORT, METRICS);

        assert_eq!(pos.placement, Placement::BottomLeft);
        assert_eq!((pos.x, pos.y), (100.0, 168.0));
        assert_eq!(
            pos.arrow,
            Some(Arrow {
                side: ArrowSide::Top,
                offset: 20.0
            })
        );
    }

    #[test]
    fn test_flips_to_bottom_right_near_right_edge() {
        let target = Rect::new(1100.0, 100.0, 150.0, 40.0);
        let pos = place_toolbar(target, TOOLBAR, VIEWPORT, METRICS);

        assert_eq!(pos.placement, Placement::BottomRight);
        assert_eq!(pos.x, 1250.0 - 320.0);
        assert_eq!(pos.arrow.map(|a| a.offset), Some(300.0));
    }

    #[test]
    fn test_goes_above_when_target_hugs_bottom() {
        let target = Rect::new(200.0, 720.0, 300.0, 60.0);
        let pos = place_toolbar(target, TOOLBAR, VIEWPORT, METRICS);

        assert_eq!(pos.placement, Placement::TopLeft);
        assert_eq!(pos.y, 720.0 - 48.0 - 8.0);
        assert_eq!(pos.arrow.map(|a| a.side), Some(ArrowSide::Bottom));
    }

    #[test]
    fn test_side_placement_for_full_height_target() {
        // Tall target leaves no room above or below.
        let target = Rect::new(100.0, 0.0, 300.0, 800.0);
        let pos = place_toolbar(target, TOOLBAR, VIEWPORT, METRICS);

        assert_eq!(pos.placement, Placement::RightTop);
        assert_eq!((pos.x, pos.y), (408.0, 0.0));
        assert_eq!(pos.arrow.map(|a| a.side), Some(ArrowSide::Left));
    }

    #[test]
    fn test_left_top_when_right_side_is_blocked() {
        let target = Rect::new(900.0, 0.0, 300.0, 800.0);
        let pos = place_toolbar(target, TOOLBAR, VIEWPORT, METRICS);

        assert_eq!(pos.placement, Placement::LeftTop);
        assert_eq!(pos.x, 900.0 - 320.0 - 8.0);
    }

    #[test]
    fn test_falls_back_to_clamped_without_arrow() {
        // Target covers the whole viewport: no anchored candidate fits.
        let target = Rect::new(0.0, 0.0, 1280.0, 800.0);
        let pos = place_toolbar(target, TOOLBAR, VIEWPORT, METRICS);

        assert_eq!(pos.placement, Placement::ViewportClamped);
        assert!(pos.arrow.is_none());
        assert_eq!(pos.x, 0.0);
        assert_eq!(pos.y, 800.0 - 48.0);
        assert!(VIEWPORT.as_rect().contains_rect(&pos.bounds()));
    }

    #[test]
    fn test_oversized_toolbar_pins_to_origin() {
        let target = Rect::new(10.0, 10.0, 50.0, 50.0);
        let pos = place_toolbar(target, Size::new(400.0, 900.0), Size::new(300.0, 600.0), METRICS);

        assert_eq!(pos.placement, Placement::ViewportClamped);
        assert_eq!((pos.x, pos.y), (0.0, 0.0));
    }

    #[test]
    fn test_rect_edges() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.right(), 40.0);
        assert_eq!(rect.bottom(), 60.0);
        assert!(!rect.is_empty());
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).is_empty());
    }
}
