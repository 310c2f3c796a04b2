//! # Selection Resolver
//!
//! Collapses the raw editor state into one [`EditorSelection`] and decides
//! which single toolbar it calls for.
//!
//! ## Priority
//!
//! 1. Text editing: a caret in an element beats everything else
//! 2. Explicit toolbar hint (form/image sub-toolbars over the generic one)
//! 3. Selected element
//! 4. Selected section, only when no element is selected
//!
//! Conflicting input (element and section both set) is not an error; the
//! order above settles it.

use crate::errors::EngineError;
use crate::geometry::Size;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Edit,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolbarType {
    Text,
    Element,
    Section,
    Form,
    Image,
}

impl ToolbarType {
    pub const ALL: [ToolbarType; 5] = [
        ToolbarType::Text,
        ToolbarType::Element,
        ToolbarType::Section,
        ToolbarType::Form,
        ToolbarType::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolbarType::Text => "text",
            ToolbarType::Element => "element",
            ToolbarType::Section => "section",
            ToolbarType::Form => "form",
            ToolbarType::Image => "image",
        }
    }

    /// Size assumed until the presentation layer has measured the toolbar
    pub fn default_size(&self) -> Size {
        match self {
            ToolbarType::Section => Size::new(280.0, 48.0),
            ToolbarType::Element => Size::new(320.0, 48.0),
            ToolbarType::Text => Size::new(360.0, 48.0),
            ToolbarType::Form => Size::new(300.0, 48.0),
            ToolbarType::Image => Size::new(280.0, 48.0),
        }
    }
}

impl fmt::Display for ToolbarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolbarType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolbarType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::UnknownToolbarType(s.to_string()))
    }
}

/// An element inside a section
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    pub section_id: String,
    pub element_key: String,
}

impl ElementRef {
    pub fn new(section_id: impl Into<String>, element_key: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            element_key: element_key.into(),
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section_id, self.element_key)
    }
}

/// Raw editor state as reported by the editor store on every change
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorSnapshot {
    pub mode: Mode,
    pub is_text_editing: bool,
    pub text_editing_element: Option<ElementRef>,
    pub selected_element: Option<ElementRef>,
    pub selected_section: Option<String>,
    /// Explicit toolbar requested by the caller
    pub toolbar: Option<ToolbarType>,
}

/// Canonical selection for one resolution cycle
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSelection {
    pub mode: Mode,
    pub is_text_editing: bool,
    /// Set only while a caret is actually inside an element
    pub text_editing_target: Option<ElementRef>,
    pub selected_element: Option<ElementRef>,
    pub selected_section: Option<String>,
    pub toolbar_type_hint: Option<ToolbarType>,
}

/// What a toolbar points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarTarget {
    pub section_id: String,
    pub element_key: Option<String>,
}

impl ToolbarTarget {
    pub fn section(section_id: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            element_key: None,
        }
    }
}

impl From<&ElementRef> for ToolbarTarget {
    fn from(element: &ElementRef) -> Self {
        Self {
            section_id: element.section_id.clone(),
            element_key: Some(element.element_key.clone()),
        }
    }
}

/// Stateless priority resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionResolver;

impl SelectionResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, raw: &EditorSnapshot) -> EditorSelection {
        let text_editing_target = if raw.is_text_editing {
            raw.text_editing_element.clone()
        } else {
            None
        };

        EditorSelection {
            mode: raw.mode,
            is_text_editing: raw.is_text_editing,
            text_editing_target,
            selected_element: raw.selected_element.clone(),
            selected_section: raw.selected_section.clone(),
            toolbar_type_hint: raw.toolbar,
        }
    }

    pub fn active_toolbar(&self, selection: &EditorSelection) -> Option<ToolbarType> {
        if selection.mode == Mode::Preview {
            return None;
        }

        if selection.text_editing_target.is_some() {
            return Some(ToolbarType::Text);
        }

        let has_selection =
            selection.selected_element.is_some() || selection.selected_section.is_some();

        // A text hint without a caret has nothing to format.
        match selection.toolbar_type_hint {
            Some(hint) if hint != ToolbarType::Text && has_selection => return Some(hint),
            _ => {}
        }

        if selection.selected_element.is_some() {
            Some(ToolbarType::Element)
        } else if selection.selected_section.is_some() {
            Some(ToolbarType::Section)
        } else {
            None
        }
    }

    pub fn should_show(&self, toolbar: ToolbarType, selection: &EditorSelection) -> bool {
        self.active_toolbar(selection) == Some(toolbar)
    }

    /// Target of the naturally active toolbar, in the same priority order
    pub fn toolbar_target(&self, selection: &EditorSelection) -> Option<ToolbarTarget> {
        if selection.mode == Mode::Preview {
            return None;
        }

        if let Some(text) = &selection.text_editing_target {
            return Some(text.into());
        }

        if let Some(element) = &selection.selected_element {
            return Some(element.into());
        }

        selection
            .selected_section
            .as_ref()
            .map(|section| ToolbarTarget::section(section.clone()))
    }

    pub fn can_show_text_toolbar(&self, selection: &EditorSelection) -> bool {
        selection.text_editing_target.is_some()
    }

    pub fn can_show_element_toolbar(&self, selection: &EditorSelection) -> bool {
        selection.selected_element.is_some() && selection.text_editing_target.is_none()
    }

    pub fn can_show_section_toolbar(&self, selection: &EditorSelection) -> bool {
        selection.selected_section.is_some()
            && selection.selected_element.is_none()
            && selection.text_editing_target.is_none()
    }

    pub fn is_active_text_element(
        &self,
        selection: &EditorSelection,
        section_id: &str,
        element_key: &str,
    ) -> bool {
        selection
            .text_editing_target
            .as_ref()
            .is_some_and(|t| t.section_id == section_id && t.element_key == element_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> EditorSnapshot {
        EditorSnapshot::default()
    }

    #[test]
    fn test_element_beats_section() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            selected_element: Some(ElementRef::new("hero", "headline")),
            selected_section: Some("hero".to_string()),
            ..snapshot()
        };
        let selection = resolver.resolve(&raw);

        assert_eq!(resolver.active_toolbar(&selection), Some(ToolbarType::Element));
        assert!(!resolver.should_show(ToolbarType::Section, &selection));
        assert!(resolver.should_show(ToolbarType::Element, &selection));
    }

    #[test]
    fn test_text_editing_suppresses_everything() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            is_text_editing: true,
            text_editing_element: Some(ElementRef::new("hero", "headline")),
            selected_element: Some(ElementRef::new("hero", "cta")),
            selected_section: Some("hero".to_string()),
            toolbar: Some(ToolbarType::Image),
            ..snapshot()
        };
        let selection = resolver.resolve(&raw);

        assert_eq!(resolver.active_toolbar(&selection), Some(ToolbarType::Text));
        assert_eq!(
            resolver.toolbar_target(&selection),
            Some(ToolbarTarget::from(&ElementRef::new("hero", "headline")))
        );
        assert!(resolver.is_active_text_element(&selection, "hero", "headline"));
        assert!(!resolver.can_show_element_toolbar(&selection));
    }

    #[test]
    fn test_text_flag_without_target_is_not_text_editing() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            is_text_editing: true,
            selected_section: Some("faq".to_string()),
            ..snapshot()
        };
        let selection = resolver.resolve(&raw);

        assert!(selection.text_editing_target.is_none());
        assert_eq!(resolver.active_toolbar(&selection), Some(ToolbarType::Section));
        assert!(resolver.can_show_section_toolbar(&selection));
    }

    #[test]
    fn test_can_show_helpers_follow_priority_without_caret() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            is_text_editing: true,
            selected_element: Some(ElementRef::new("hero", "headline")),
            selected_section: Some("hero".to_string()),
            ..snapshot()
        };
        let selection = resolver.resolve(&raw);

        assert_eq!(resolver.active_toolbar(&selection), Some(ToolbarType::Element));
        assert!(!resolver.can_show_text_toolbar(&selection));
        assert!(resolver.can_show_element_toolbar(&selection));
        assert!(!resolver.can_show_section_toolbar(&selection));
    }

    #[test]
    fn test_hint_overrides_element_toolbar() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            selected_element: Some(ElementRef::new("signup", "form")),
            toolbar: Some(ToolbarType::Form),
            ..snapshot()
        };
        let selection = resolver.resolve(&raw);

        assert_eq!(resolver.active_toolbar(&selection), Some(ToolbarType::Form));
        assert!(!resolver.should_show(ToolbarType::Element, &selection));
    }

    #[test]
    fn test_hint_needs_a_selection() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            toolbar: Some(ToolbarType::Image),
            ..snapshot()
        };
        assert_eq!(resolver.active_toolbar(&resolver.resolve(&raw)), None);

        let text_hint = EditorSnapshot {
            selected_section: Some("hero".to_string()),
            toolbar: Some(ToolbarType::Text),
            ..snapshot()
        };
        assert_eq!(
            resolver.active_toolbar(&resolver.resolve(&text_hint)),
            Some(ToolbarType::Section)
        );
    }

    #[test]
    fn test_preview_mode_shows_nothing() {
        let resolver = SelectionResolver::new();
        let raw = EditorSnapshot {
            mode: Mode::Preview,
            selected_element: Some(ElementRef::new("hero", "headline")),
            ..snapshot()
        };
        let selection = resolver.resolve(&raw);

        assert_eq!(resolver.active_toolbar(&selection), None);
        assert_eq!(resolver.toolbar_target(&selection), None);
    }

    #[test]
    fn test_toolbar_type_parsing() {
        assert_eq!("image".parse::<ToolbarType>().unwrap(), ToolbarType::Image);
        assert!("floating".parse::<ToolbarType>().is_err());
        assert_eq!(ToolbarType::Form.to_string(), "form");
    }

    #[test]
    fn test_snapshot_from_camel_case_json() {
        let json = r#"{
            "mode": "edit",
            "isTextEditing": false,
            "selectedElement": { "sectionId": "hero", "elementKey": "headline" },
            "selectedSection": "hero"
        }"#;
        let raw: EditorSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(raw.selected_element, Some(ElementRef::new("hero", "headline")));
        assert_eq!(raw.toolbar, None);
    }
}
