use pagebuilder_selection::{
    AnchorKey, AnchorTarget, Clock, EditorSnapshot, EngineConfig, Rect, SelectionSession, Size,
    Timestamp, ToolbarType,
};
use serde::Serialize;
use std::fmt;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
extern "C" {
    /// Any DOM element; only the two members below are used
    pub type MeasurableElement;

    #[wasm_bindgen(method, getter, js_name = isConnected)]
    fn is_connected(this: &MeasurableElement) -> bool;

    #[wasm_bindgen(method, js_name = getBoundingClientRect)]
    fn get_bounding_client_rect(this: &MeasurableElement) -> ClientRect;

    type ClientRect;

    #[wasm_bindgen(method, getter)]
    fn left(this: &ClientRect) -> f64;

    #[wasm_bindgen(method, getter)]
    fn top(this: &ClientRect) -> f64;

    #[wasm_bindgen(method, getter)]
    fn width(this: &ClientRect) -> f64;

    #[wasm_bindgen(method, getter)]
    fn height(this: &ClientRect) -> f64;

    #[wasm_bindgen(js_namespace = performance, js_name = now)]
    fn performance_now() -> f64;
}

/// Anchor target backed by a live DOM element
struct DomTarget {
    element: MeasurableElement,
}

impl fmt::Debug for DomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DomTarget")
    }
}

impl AnchorTarget for DomTarget {
    fn bounding_rect(&self) -> Option<Rect> {
        if !self.element.is_connected() {
            return None;
        }
        let rect = self.element.get_bounding_client_rect();
        Some(Rect::new(rect.left(), rect.top(), rect.width(), rect.height()))
    }
}

/// `performance.now()` relative to engine creation
#[derive(Debug)]
struct PerformanceClock {
    origin: f64,
}

impl PerformanceClock {
    fn new() -> Self {
        Self {
            origin: performance_now(),
        }
    }
}

impl Clock for PerformanceClock {
    fn now(&self) -> Timestamp {
        (performance_now() - self.origin).max(0.0) as Timestamp
    }
}

/// Selection arbitration for one editor canvas
#[wasm_bindgen]
pub struct SelectionEngine {
    session: SelectionSession,
}

#[wasm_bindgen]
impl SelectionEngine {
    /// Create an engine; `config_json` overrides the defaults field by field
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<SelectionEngine, JsValue> {
        let config = parse_config(config_json.as_deref()).map_err(js_error)?;
        Ok(Self {
            session: SelectionSession::with_clock(
                "canvas",
                config,
                Box::new(PerformanceClock::new()),
            ),
        })
    }

    /// Feed the editor store state; returns the resolution as JSON
    pub fn update(&mut self, snapshot_json: &str) -> Result<String, JsValue> {
        update_json(&mut self.session, snapshot_json).map_err(js_error)
    }

    /// Visibility of one toolbar type as JSON
    pub fn visibility(
        &mut self,
        toolbar: &str,
        width: Option<f64>,
        height: Option<f64>,
    ) -> Result<String, JsValue> {
        visibility_json(&mut self.session, toolbar, measured_size(width, height)).map_err(js_error)
    }

    #[wasm_bindgen(js_name = registerAnchor)]
    pub fn register_anchor(&mut self, key: &str, element: MeasurableElement) -> Result<bool, JsValue> {
        let key = parse_key(key).map_err(js_error)?;
        Ok(self
            .session
            .register_anchor(key, Box::new(DomTarget { element })))
    }

    #[wasm_bindgen(js_name = unregisterAnchor)]
    pub fn unregister_anchor(&mut self, key: &str) -> Result<bool, JsValue> {
        let key = parse_key(key).map_err(js_error)?;
        Ok(self.session.unregister_anchor(&key))
    }

    /// Re-position the active toolbar; JSON visibility or `null`
    #[wasm_bindgen(js_name = onScroll)]
    pub fn on_scroll(&mut self) -> Result<String, JsValue> {
        to_json(&self.session.on_scroll()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = onResize)]
    pub fn on_resize(&mut self, width: f64, height: f64) -> Result<String, JsValue> {
        to_json(&self.session.on_resize(Size::new(width, height))).map_err(js_error)
    }

    #[wasm_bindgen(js_name = attemptAttach)]
    pub fn attempt_attach(&mut self, id: &str, owner: Option<String>) -> bool {
        self.session.attempt_attach(id, owner.as_deref())
    }

    #[wasm_bindgen(js_name = attemptDetach)]
    pub fn attempt_detach(&mut self, id: &str, owner: Option<String>) {
        self.session.attempt_detach(id, owner.as_deref());
    }

    #[wasm_bindgen(js_name = isFrozen)]
    pub fn is_frozen(&mut self, id: &str) -> bool {
        self.session.is_frozen(id)
    }

    #[wasm_bindgen(js_name = manualUnfreeze)]
    pub fn manual_unfreeze(&mut self, id: &str) -> bool {
        self.session.manual_unfreeze(id)
    }

    #[wasm_bindgen(js_name = stabilityStats)]
    pub fn stability_stats(&self, id: &str) -> Result<String, JsValue> {
        to_json(&self.session.stability_stats(id)).map_err(js_error)
    }

    /// Fire due timers; JSON array of what fired
    pub fn tick(&mut self) -> Result<String, JsValue> {
        to_json(&self.session.tick()).map_err(js_error)
    }

    /// Milliseconds on the engine clock of the next timer, if any
    #[wasm_bindgen(js_name = nextDeadline)]
    pub fn next_deadline(&self) -> Option<f64> {
        self.session.next_deadline().map(|at| at as f64)
    }

    #[wasm_bindgen(js_name = diagnosticReport)]
    pub fn diagnostic_report(&self) -> Result<String, JsValue> {
        to_json(&self.session.diagnostic_report()).map_err(js_error)
    }
}

fn js_error(message: String) -> JsValue {
    JsValue::from_str(&message)
}

fn parse_config(json: Option<&str>) -> Result<EngineConfig, String> {
    match json {
        Some(json) if !json.trim().is_empty() => {
            EngineConfig::from_json_str(json).map_err(|e| e.to_string())
        }
        _ => Ok(EngineConfig::default()),
    }
}

fn parse_key(key: &str) -> Result<AnchorKey, String> {
    key.parse::<AnchorKey>().map_err(|e| e.to_string())
}

/// A toolbar size only counts once both dimensions are known
fn measured_size(width: Option<f64>, height: Option<f64>) -> Option<Size> {
    match (width, height) {
        (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {
            Some(Size::new(width, height))
        }
        _ => None,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization error: {}", e))
}

fn update_json(session: &mut SelectionSession, snapshot_json: &str) -> Result<String, String> {
    let snapshot: EditorSnapshot =
        serde_json::from_str(snapshot_json).map_err(|e| format!("Snapshot error: {}", e))?;
    to_json(&session.update(&snapshot))
}

fn visibility_json(
    session: &mut SelectionSession,
    toolbar: &str,
    size: Option<Size>,
) -> Result<String, String> {
    let toolbar = toolbar
        .parse::<ToolbarType>()
        .map_err(|e| e.to_string())?;
    to_json(&session.toolbar_visibility(toolbar, size))
}
