//! Configuration validation.

use crate::engine::fifo::WORD_BITS;
use crate::error::{ConfigError, Error, Result};
use crate::motion::amass::AMASS_OVERDRIVE_HZ;
use crate::motion::MAX_AXES;

use super::{SystemConfig, MAX_DISABLE_DELAY_US};

/// Validate a system configuration.
///
/// Checks:
/// - Between 1 and `MAX_AXES` axes are configured
/// - Pulse width is at least 1us
/// - Driver enable delay is at most `MAX_DISABLE_DELAY_US`
/// - Timer frequency is high enough to derive an AMASS threshold
/// - Acceleration tick rate is nonzero
/// - Every pin fits a 32-bit output word
pub fn validate_config(config: &SystemConfig) -> Result<()> {
    let n_axis = config.axes.len();
    if n_axis == 0 || n_axis > MAX_AXES {
        return Err(Error::Config(ConfigError::InvalidAxisCount(n_axis)));
    }

    let stepping = &config.stepping;
    if stepping.pulse_us == 0 {
        return Err(Error::Config(ConfigError::InvalidPulseWidth(stepping.pulse_us)));
    }

    if stepping.disable_delay_us > MAX_DISABLE_DELAY_US {
        return Err(Error::Config(ConfigError::InvalidDisableDelay(
            stepping.disable_delay_us,
        )));
    }

    if stepping.timer_frequency_hz < AMASS_OVERDRIVE_HZ {
        return Err(Error::Config(ConfigError::InvalidTimerFrequency(
            stepping.timer_frequency_hz,
        )));
    }

    if stepping.acceleration_ticks_per_second == 0 {
        return Err(Error::Config(ConfigError::InvalidAccelerationTicks(
            stepping.acceleration_ticks_per_second,
        )));
    }

    for axis in config.axes.iter() {
        for pin in [axis.step_pin, axis.dir_pin] {
            if pin >= WORD_BITS {
                return Err(Error::Config(ConfigError::InvalidPin(pin)));
            }
        }
    }

    Ok(())
}
