//! # stepper-segments
//!
//! Segment-buffered multi-axis step generation with AMASS smoothing and pluggable
//! step engines.
//!
//! ## Features
//!
//! - **Segment preparation**: Planner blocks are sliced into fixed-duration segments
//!   carrying whole step counts and a timer period, with exact step conservation
//! - **AMASS**: Adaptive multi-axis step smoothing at low step rates
//! - **Bresenham executor**: Interrupt-context multi-axis line tracer
//! - **Pluggable step engines**: Spin-wait GPIO, pulse-replay channels, FIFO shift
//!   registers and bit-banged shift-out behind one `StepEngine` trait
//! - **Lock-free buffers**: Single-producer/single-consumer segment ring
//! - **no_std compatible**: Core library works without standard library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_segments::{EngineRegistry, StepperCore, SystemConfig};
//!
//! let config: SystemConfig = stepper_segments::load_config("machine.toml")?;
//!
//! let mut registry = EngineRegistry::<4>::new();
//! registry.register(&mut timed)?;
//! registry.register(&mut rmt)?;
//! let engine = registry.take(config.engine_name())?;
//!
//! let mut stepper = StepperCore::<_, 16>::new(engine, &config)?;
//! stepper.prep_buffer(&mut planner, &spindle, &mut control);
//! stepper.wake_up(&mut drivers, &mut delay);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O and TOML parsing
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

// Core modules
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod machine;
pub mod motion;
pub mod stepper;

// Re-exports for ergonomic API
pub use buffer::{RingBuffer, SegmentBuffers};
pub use config::{
    validate_config, AxisConfig, SteppingConfig, SystemConfig, IDLE_MS_NEVER_DISABLE,
    MAX_DISABLE_DELAY_US,
};
pub use engine::{EngineRegistry, EngineState, EngineTiming, StepEngine, StepPinHandle, UnstepAction};
pub use error::{ConfigError, EngineError, Error, Result};
pub use machine::{MachineState, MotorDrivers, Planner, Probe, Signals, Spindle, StepControl};
pub use motion::{
    AxisPins, PlannerBlock, PulseExecutor, Segment, SegmentPreparer, SpindleState, StepperBlockData,
    MAX_AMASS_LEVEL, MAX_AXES,
};
pub use stepper::{Background, Interrupt, StepperCore};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};
