//! Step timing configuration.

use heapless::String;
use serde::Deserialize;

use crate::engine::EngineTiming;
use crate::motion::amass::amass_threshold;

/// `idle_ms` value that keeps drivers enabled forever.
pub const IDLE_MS_NEVER_DISABLE: u32 = 255;

/// Longest accepted `disable_delay_us`.
pub const MAX_DISABLE_DELAY_US: u32 = 1_000_000;

/// `[stepping]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SteppingConfig {
    /// Step engine to select from the board's registry.
    #[serde(default = "default_engine")]
    pub engine: String<32>,

    /// Step pulse width in microseconds.
    #[serde(default = "default_pulse_us")]
    pub pulse_us: u32,

    /// Settle time after a direction change in microseconds.
    #[serde(default)]
    pub dir_delay_us: u32,

    /// Delay before disabling drivers when idle; 255 keeps them enabled.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u32,

    /// Settle time after enabling drivers before the first step, microseconds.
    #[serde(default)]
    pub disable_delay_us: u32,

    /// Step timer tick frequency in Hz.
    #[serde(default = "default_timer_frequency_hz")]
    pub timer_frequency_hz: u32,

    /// Segments per second of profile time.
    #[serde(default = "default_acceleration_ticks")]
    pub acceleration_ticks_per_second: u32,
}

fn default_engine() -> String<32> {
    let mut name = String::new();
    let _ = name.push_str("timed");
    name
}

fn default_pulse_us() -> u32 {
    4
}

fn default_idle_ms() -> u32 {
    IDLE_MS_NEVER_DISABLE
}

fn default_timer_frequency_hz() -> u32 {
    20_000_000
}

fn default_acceleration_ticks() -> u32 {
    100
}

impl Default for SteppingConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            pulse_us: default_pulse_us(),
            dir_delay_us: 0,
            idle_ms: default_idle_ms(),
            disable_delay_us: 0,
            timer_frequency_hz: default_timer_frequency_hz(),
            acceleration_ticks_per_second: default_acceleration_ticks(),
        }
    }
}

impl SteppingConfig {
    /// Timing handed to the step engine at init.
    pub fn timing(&self) -> EngineTiming {
        EngineTiming {
            dir_delay_us: self.dir_delay_us,
            pulse_us: self.pulse_us,
            frequency_hz: self.timer_frequency_hz,
        }
    }

    /// Segment duration in minutes.
    pub fn dt_segment(&self) -> f32 {
        1.0 / (self.acceleration_ticks_per_second.max(1) as f32 * 60.0)
    }

    /// Timer ticks above which AMASS raises the smoothing level.
    pub fn amass_threshold(&self) -> u32 {
        amass_threshold(self.timer_frequency_hz)
    }

    /// Drivers are disabled after `idle_ms` of inactivity.
    pub fn disables_drivers(&self) -> bool {
        self.idle_ms != IDLE_MS_NEVER_DISABLE
    }
}
