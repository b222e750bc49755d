//! System configuration - root configuration structure.

use heapless::Vec;
use serde::Deserialize;

use super::axis::AxisConfig;
use super::stepping::SteppingConfig;
use crate::motion::MAX_AXES;

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemConfig {
    /// Step timing and engine selection.
    #[serde(default)]
    pub stepping: SteppingConfig,

    /// Axes in executor order.
    #[serde(default)]
    pub axes: Vec<AxisConfig, MAX_AXES>,
}

impl SystemConfig {
    /// Number of configured axes.
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Get an axis configuration by index.
    pub fn axis(&self, index: usize) -> Option<&AxisConfig> {
        self.axes.get(index)
    }

    /// Name of the step engine to select.
    pub fn engine_name(&self) -> &str {
        self.stepping.engine.as_str()
    }
}
