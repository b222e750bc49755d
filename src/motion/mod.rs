//! Motion module: segment preparation and pulse execution.
//!
//! Planner blocks flow through [`SegmentPreparer`] into the segment ring and
//! are traced into step pulses by [`PulseExecutor`].

pub mod amass;
mod block;
mod executor;
mod prep;
pub mod ramp;

pub use block::{
    AxisMask, PlMotion, PlannerBlock, Segment, SpindleState, StepperBlockData, MAX_AMASS_LEVEL,
    MAX_AXES, MAX_BLOCK_STEPS,
};
pub use executor::{AxisPins, PulseExecutor};
pub use prep::{SegmentPreparer, REQ_MM_INCREMENT_SCALAR};
pub use ramp::{PrepFlags, RampPhase, RampState};
