//! Unit tests for TOML configuration parsing.

use stepper_segments::config::{load_config, parse_config, SystemConfig, IDLE_MS_NEVER_DISABLE};

/// Test parsing a three-axis machine with inverted outputs.
#[test]
fn test_parse_axes_in_table_order() {
    let toml_str = r#"
[stepping]
engine = "rmt"
pulse_us = 3

[[axes]]
step_pin = 12
dir_pin = 14

[[axes]]
step_pin = 26
dir_pin = 15
dir_invert = true

[[axes]]
step_pin = 27
dir_pin = 13
step_invert = true
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");

    assert_eq!(config.axis_count(), 3);
    assert_eq!(config.engine_name(), "rmt");
    let x = config.axis(0).expect("X axis missing");
    assert_eq!((x.step_pin, x.dir_pin), (12, 14));
    assert!(!x.step_invert && !x.dir_invert);
    assert!(config.axis(1).unwrap().dir_invert);
    assert!(config.axis(2).unwrap().step_invert);
    assert!(config.axis(3).is_none());
}

/// Test that an omitted `[stepping]` table takes every default.
#[test]
fn test_stepping_defaults() {
    let toml_str = r#"
[[axes]]
step_pin = 0
dir_pin = 1
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    let stepping = &config.stepping;

    assert_eq!(stepping.engine.as_str(), "timed");
    assert_eq!(stepping.pulse_us, 4);
    assert_eq!(stepping.dir_delay_us, 0);
    assert_eq!(stepping.idle_ms, IDLE_MS_NEVER_DISABLE);
    assert_eq!(stepping.disable_delay_us, 0);
    assert!(!stepping.disables_drivers());
    assert_eq!(stepping.timer_frequency_hz, 20_000_000);
    assert_eq!(stepping.acceleration_ticks_per_second, 100);
}

/// Test derived timing values.
#[test]
fn test_derived_timing() {
    let toml_str = r#"
[stepping]
pulse_us = 5
dir_delay_us = 1
timer_frequency_hz = 16000000
acceleration_ticks_per_second = 50

[[axes]]
step_pin = 0
dir_pin = 1
"#;

    let config = parse_config(toml_str).expect("Config should be valid");
    let timing = config.stepping.timing();

    assert_eq!(timing.pulse_us, 5);
    assert_eq!(timing.dir_delay_us, 1);
    assert_eq!(timing.frequency_hz, 16_000_000);
    assert_eq!(config.stepping.amass_threshold(), 2_000);
    assert!((config.stepping.dt_segment() - 1.0 / 3000.0).abs() < 1e-9);
}

/// Test that an oversized axis list does not deserialize.
#[test]
fn test_too_many_axes_rejected() {
    let mut toml_str = String::new();
    for n in 0..7 {
        toml_str.push_str(&format!("[[axes]]\nstep_pin = {}\ndir_pin = {}\n", n, n + 8));
    }

    assert!(parse_config(&toml_str).is_err());
}

/// Test loading from a file on disk.
#[test]
fn test_load_config_from_file() {
    let path = std::env::temp_dir().join("stepper_segments_load_test.toml");
    std::fs::write(
        &path,
        "[stepping]\nengine = \"i2s\"\n\n[[axes]]\nstep_pin = 4\ndir_pin = 5\n",
    )
    .expect("Failed to write config");

    let config = load_config(&path).expect("Config should load");
    std::fs::remove_file(&path).ok();

    assert_eq!(config.engine_name(), "i2s");
    assert_eq!(config.axis(0).unwrap().step_pin, 4);
}
