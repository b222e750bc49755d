//! Adaptive multi-axis step smoothing (AMASS).
//!
//! At low step rates the timer period per dominant-axis step gets long, and the
//! non-dominant Bresenham axes alias badly. Each AMASS level halves the timer
//! period and doubles the segment's step events, letting minor axes step
//! between dominant-axis steps. Block counts are pre-scaled by
//! `2^MAX_AMASS_LEVEL`, so right-shifting them per level is exact.

use super::block::MAX_AMASS_LEVEL;

/// Equivalent ISR overdrive frequency the threshold is derived from.
pub const AMASS_OVERDRIVE_HZ: u32 = 8_000;

/// Timer-tick threshold above which another AMASS level is applied.
#[inline]
pub const fn amass_threshold(timer_hz: u32) -> u32 {
    timer_hz / AMASS_OVERDRIVE_HZ
}

/// Timer ticks per dominant-axis step for a step period given in minutes.
#[inline]
pub fn step_timer_ticks(timer_hz: u32, inv_rate_min: f32) -> u32 {
    // f32 -> u32 casts saturate, which clamps runaway periods at u32::MAX
    // and maps NaN to 0. A timer period is never shorter than one tick.
    (libm::ceilf(timer_hz as f32 * 60.0 * inv_rate_min) as u32).max(1)
}

/// Result of AMASS level selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AmassSelection {
    /// Chosen level, `0..=MAX_AMASS_LEVEL`
    pub level: u8,
    /// Timer ticks per ISR tick after shifting by `level`
    pub ticks: u32,
}

impl AmassSelection {
    /// ISR period clamped to a 16-bit timer.
    #[inline]
    pub fn isr_period(&self) -> u16 {
        u16::try_from(self.ticks).unwrap_or(u16::MAX)
    }
}

/// Pick the smallest level that brings the period under `threshold`.
pub fn select_level(timer_ticks: u32, threshold: u32) -> AmassSelection {
    let mut ticks = timer_ticks;
    let mut level = 0;
    while level < MAX_AMASS_LEVEL {
        if ticks < threshold {
            break;
        }
        ticks >>= 1;
        level += 1;
    }
    AmassSelection { level, ticks }
}
