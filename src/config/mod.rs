//! Configuration module for stepper-segments.
//!
//! Provides the step timing and axis pin configuration, loaded from TOML files
//! (with `std` feature) or built in code.

mod axis;
mod stepping;
mod system;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use axis::AxisConfig;
pub use stepping::{SteppingConfig, IDLE_MS_NEVER_DISABLE, MAX_DISABLE_DELAY_US};
pub use system::SystemConfig;
pub use validation::validate_config;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};
