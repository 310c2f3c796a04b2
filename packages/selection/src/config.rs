//! Engine configuration
//!
//! Every threshold is a product-tuned default; a config file only needs the
//! fields it overrides.

use crate::errors::EngineError;
use crate::geometry::PlacementMetrics;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "selection.config.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub lock: LockConfig,
    pub anchors: AnchorConfig,
    pub stability: StabilityConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockConfig {
    /// How long a transition keeps its toolbar on screen
    pub lock_duration_ms: u64,

    /// Identical transitions inside this window are ignored
    pub debounce_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_duration_ms: 350,
            debounce_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnchorConfig {
    /// Anchors not re-measured for this long are evicted
    pub stale_timeout_ms: u64,

    /// Period of the staleness sweep
    pub sweep_interval_ms: u64,

    /// Gap between target and toolbar, in px
    pub toolbar_spacing: f64,

    /// Arrow inset from the toolbar corner, in px
    pub arrow_offset: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: 3000,
            sweep_interval_ms: 100,
            toolbar_spacing: 8.0,
            arrow_offset: 20.0,
        }
    }
}

impl AnchorConfig {
    pub fn metrics(&self) -> PlacementMetrics {
        PlacementMetrics {
            spacing: self.toolbar_spacing,
            arrow_offset: self.arrow_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StabilityConfig {
    /// When false every attach is allowed (development builds)
    pub enabled: bool,

    pub max_attachments_per_second: f64,

    /// Attachment counts reset once the window is this old
    pub tracking_window_ms: u64,

    pub freeze_duration_ms: u64,

    /// Delay after the freeze ends before the automatic unfreeze runs
    pub retry_grace_ms: u64,

    /// At most one "attachment blocked" warning per id in this interval
    pub freeze_warning_interval_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attachments_per_second: 10.0,
            tracking_window_ms: 2000,
            freeze_duration_ms: 16, // one frame at 60fps
            retry_grace_ms: 50,
            freeze_warning_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
    /// Capacity of the in-session event buffer
    pub max_events: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { max_events: 200 }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load config from a file; a missing file means defaults
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Load `selection.config.json` from a directory
    pub fn load_from_dir(dir: &Path) -> Result<Self, EngineError> {
        Self::load(&dir.join(DEFAULT_CONFIG_NAME))
    }
}
