//! Unit test harness for stepper-segments.
//!
//! This module organizes configuration tests by concern.

mod config_parsing;
mod config_validation;
