//! Rendering parameters attached to a generation request

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parameters that accompany a prompt
///
/// `width` and `height` select the resolution bucket. Every other
/// style/control parameter goes into `controls` and becomes part of the
/// canonical text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderParams {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Style and control flags (e.g. `style`, `variant`, `sampler`)
    #[serde(default)]
    pub controls: BTreeMap<String, String>,
}

impl RenderParams {
    /// Create parameters for the given resolution
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            controls: BTreeMap::new(),
        }
    }

    /// Add a control parameter
    pub fn with_control(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.controls.insert(key.into(), value.into());
        self
    }

    /// Set the style control
    pub fn with_style(self, style: impl Into<String>) -> Self {
        self.with_control("style", style)
    }
}
