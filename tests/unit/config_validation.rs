//! Unit tests for configuration validation.

use stepper_segments::config::{validate_config, SystemConfig};
use stepper_segments::error::{ConfigError, Error};

fn parse(toml_str: &str) -> SystemConfig {
    toml::from_str(toml_str).expect("Failed to parse TOML")
}

/// Test validation of a valid configuration.
#[test]
fn test_valid_config_passes_validation() {
    let config = parse(
        r#"
[stepping]
engine = "i2s_stream"
pulse_us = 4

[[axes]]
step_pin = 0
dir_pin = 1

[[axes]]
step_pin = 2
dir_pin = 3
"#,
    );
    assert!(validate_config(&config).is_ok());
}

/// Test validation fails with no axes.
#[test]
fn test_no_axes_rejected() {
    let config = parse("[stepping]\npulse_us = 4\n");
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidAxisCount(0)))
    );
}

/// Test validation fails for a zero-width pulse.
#[test]
fn test_zero_pulse_rejected() {
    let config = parse(
        r#"
[stepping]
pulse_us = 0

[[axes]]
step_pin = 0
dir_pin = 1
"#,
    );
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidPulseWidth(0)))
    );
}

/// Test validation fails for a timer too slow for AMASS.
#[test]
fn test_slow_timer_rejected() {
    let config = parse(
        r#"
[stepping]
timer_frequency_hz = 4000

[[axes]]
step_pin = 0
dir_pin = 1
"#,
    );
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidTimerFrequency(4000)))
    );
}

/// Test validation fails for zero acceleration ticks.
#[test]
fn test_zero_acceleration_ticks_rejected() {
    let config = parse(
        r#"
[stepping]
acceleration_ticks_per_second = 0

[[axes]]
step_pin = 0
dir_pin = 1
"#,
    );
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidAccelerationTicks(0)))
    );
}

/// Test validation fails for a direction pin beyond the output word.
#[test]
fn test_dir_pin_out_of_range() {
    let config = parse(
        r#"
[[axes]]
step_pin = 0
dir_pin = 32
"#,
    );
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidPin(32)))
    );
}

/// Test an enable delay beyond one second is rejected.
#[test]
fn test_long_enable_delay_rejected() {
    let config = parse(
        r#"
[stepping]
disable_delay_us = 2000000

[[axes]]
step_pin = 0
dir_pin = 1
"#,
    );
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidDisableDelay(2_000_000)))
    );
}
