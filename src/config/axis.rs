//! Per-axis pin assignment.

use serde::Deserialize;

/// One `[[axes]]` entry. Axis order follows the table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct AxisConfig {
    /// Step output pin, in the selected engine's numbering.
    pub step_pin: u8,

    /// Direction output pin.
    pub dir_pin: u8,

    /// Step pin idles high.
    #[serde(default)]
    pub step_invert: bool,

    /// Direction pin is active low.
    #[serde(default)]
    pub dir_invert: bool,
}

impl AxisConfig {
    /// Axis on the given pins, neither inverted.
    pub const fn new(step_pin: u8, dir_pin: u8) -> Self {
        Self {
            step_pin,
            dir_pin,
            step_invert: false,
            dir_invert: false,
        }
    }
}
