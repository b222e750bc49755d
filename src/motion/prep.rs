//! Segment preparation: slices planner blocks into short constant-rate
//! segments for the pulse executor.
//!
//! The preparer runs in background context. Each segment covers roughly
//! `dt_segment` minutes of the block's velocity profile and carries a whole
//! number of step events. Step counts are derived from the rounded-up
//! cumulative steps *remaining* in the block, so however the float math
//! rounds, the per-segment counts telescope to exactly the block's step event
//! count. The fraction of a step left at each segment boundary is carried into
//! the next segment's timing.

use super::amass::{select_level, step_timer_ticks};
use super::block::{PlannerBlock, Segment, SpindleState, StepperBlockData, MAX_BLOCK_STEPS};
use super::ramp::{PrepFlags, RampState};
use crate::buffer::{BlockArena, SegmentProducer};
use crate::config::SteppingConfig;
use crate::machine::{MachineState, Planner, Spindle, StepControl};

/// Minimum distance per segment, in steps of the block's resolution.
pub const REQ_MM_INCREMENT_SCALAR: f32 = 1.25;

/// Step distance below which a segment's step rate is not derived.
const MIN_STEP_DIST: f32 = 1e-6;

/// Step and time state of a block interrupted by a parking motion.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ParkedBlock {
    data: StepperBlockData,
    steps_remaining: f32,
    dt_remainder: f32,
    step_per_mm: f32,
}

/// Minutes per step over a segment that ends `step_dist_remaining` steps
/// from the block end, having started at `last_n_steps_remaining`.
fn inv_step_rate(dt: f32, last_n_steps_remaining: f32, step_dist_remaining: f32) -> f32 {
    dt / (last_n_steps_remaining - step_dist_remaining).max(MIN_STEP_DIST)
}

/// Background half of the stepper core.
#[derive(Debug, Clone)]
pub struct SegmentPreparer {
    n_axis: usize,
    timer_hz: u32,
    amass_threshold: u32,
    dt_segment: f32,

    // Copy of the planner block being sliced; written back through the planner
    block: Option<PlannerBlock>,
    from_system: bool,
    block_index: u8,
    block_data: StepperBlockData,
    restore_pending: bool,
    parked: Option<ParkedBlock>,

    flags: PrepFlags,
    ramp: RampState,
    steps_remaining: f32,
    step_per_mm: f32,
    req_mm_increment: f32,
    dt_remainder: f32,
    inv_rate: f32,
    current_spindle_speed: f32,
}

impl SegmentPreparer {
    /// Create a preparer for `n_axis` axes with the segment duration and
    /// AMASS threshold derived from `stepping`.
    pub fn new(n_axis: usize, stepping: &SteppingConfig) -> Self {
        Self::with_timing(
            n_axis,
            stepping.timer_frequency_hz,
            stepping.amass_threshold(),
            stepping.dt_segment(),
        )
    }

    fn with_timing(n_axis: usize, timer_hz: u32, amass_threshold: u32, dt_segment: f32) -> Self {
        Self {
            n_axis,
            timer_hz,
            amass_threshold,
            dt_segment,
            block: None,
            from_system: false,
            block_index: 0,
            block_data: StepperBlockData::default(),
            restore_pending: false,
            parked: None,
            flags: PrepFlags::default(),
            ramp: RampState::default(),
            steps_remaining: 0.0,
            step_per_mm: 0.0,
            req_mm_increment: 0.0,
            dt_remainder: 0.0,
            inv_rate: 0.0,
            current_spindle_speed: 0.0,
        }
    }

    /// Fill the segment ring from the planner until it is full, the planner
    /// runs dry, or the motion ends.
    ///
    /// Does nothing while `control.end_motion` is set.
    pub fn prep_buffer<P, S, const N: usize>(
        &mut self,
        planner: &mut P,
        spindle: &S,
        control: &mut StepControl,
        out: &mut SegmentProducer<'_, N>,
    ) where
        P: Planner + ?Sized,
        S: Spindle + ?Sized,
    {
        if control.end_motion {
            return;
        }

        while out.has_room() {
            let mut block = match self.block {
                Some(block) => block,
                None => match self.load_block(planner, spindle, control, out) {
                    Some(block) => block,
                    None => return,
                },
            };

            let travel = self
                .ramp
                .advance_segment(&block, self.req_mm_increment, self.dt_segment);
            let mm_remaining = travel.mm_remaining;

            if self.block_data.is_pwm_rate_adjusted || control.update_spindle_speed {
                self.current_spindle_speed = if block.spindle != SpindleState::Disable {
                    let mut speed = block.spindle_speed;
                    if self.block_data.is_pwm_rate_adjusted {
                        speed *= self.ramp.current_speed * self.inv_rate;
                    }
                    speed
                } else {
                    0.0
                };
                control.update_spindle_speed = false;
            }

            let step_dist_remaining = self.step_per_mm * mm_remaining;
            let n_steps_remaining = libm::ceilf(step_dist_remaining);
            let last_n_steps_remaining = libm::ceilf(self.steps_remaining);
            // Saturating cast: a negative difference yields zero steps
            let n_step = (last_n_steps_remaining - n_steps_remaining) as u32;

            if n_step == 0 && control.execute_hold {
                // Less than a step left to stop; the held block keeps its state
                control.end_motion = true;
                if !self.flags.parking {
                    self.flags.hold_partial_block = true;
                }
                info!("feed hold ended inside block");
                return;
            }

            let dt = travel.dt + self.dt_remainder;
            let step_inv_rate = inv_step_rate(dt, last_n_steps_remaining, step_dist_remaining);
            let amass = select_level(
                step_timer_ticks(self.timer_hz, step_inv_rate),
                self.amass_threshold,
            );

            let segment = Segment {
                n_step: n_step << amass.level,
                isr_period: amass.isr_period(),
                block_index: self.block_index,
                amass_level: amass.level,
                spindle_speed: self.current_spindle_speed,
                spindle_dev_speed: spindle.map_speed(self.current_spindle_speed),
            };
            if out.push(segment).is_err() {
                return;
            }

            block.millimeters = mm_remaining;
            if let Some(live) = self.live_block(planner) {
                live.millimeters = mm_remaining;
            }
            self.block = Some(block);
            self.steps_remaining = n_steps_remaining;
            self.dt_remainder = (n_steps_remaining - step_dist_remaining) * step_inv_rate;

            if mm_remaining == self.ramp.mm_complete {
                if mm_remaining > 0.0 {
                    // Forced deceleration finished inside the block
                    control.end_motion = true;
                    if !self.flags.parking {
                        self.flags.hold_partial_block = true;
                    }
                    info!("forced deceleration complete, {} mm left in block", mm_remaining);
                    return;
                }
                if control.execute_sys_motion {
                    control.end_motion = true;
                    return;
                }
                self.block = None;
                planner.discard_current_block();
            }
        }
    }

    fn live_block<'p, P: Planner + ?Sized>(&self, planner: &'p mut P) -> Option<&'p mut PlannerBlock> {
        if self.from_system {
            planner.system_motion_block()
        } else {
            planner.current_block()
        }
    }

    fn load_block<P, S, const N: usize>(
        &mut self,
        planner: &mut P,
        spindle: &S,
        control: &mut StepControl,
        out: &mut SegmentProducer<'_, N>,
    ) -> Option<PlannerBlock>
    where
        P: Planner + ?Sized,
        S: Spindle + ?Sized,
    {
        let live = if control.execute_sys_motion {
            planner.system_motion_block()
        } else {
            planner.current_block()
        }?;
        self.from_system = control.execute_sys_motion;

        if self.flags.recalculate {
            // Same block, new profile: Bresenham data stays put
            if self.flags.parking {
                self.flags.recalculate = false;
            } else {
                self.flags = PrepFlags::default();
            }
            if self.restore_pending {
                // The parked block moves to a fresh slot so the executor reloads it
                self.block_index = BlockArena::<N>::next_index(self.block_index);
                out.store_block(self.block_index, self.block_data);
                self.restore_pending = false;
            }
        } else {
            self.block_index = BlockArena::<N>::next_index(self.block_index);
            self.block_data = StepperBlockData::from_planner(live, self.n_axis);

            if live.step_event_count > MAX_BLOCK_STEPS {
                warn!(
                    "block of {} steps clamped to {}",
                    live.step_event_count,
                    MAX_BLOCK_STEPS
                );
            }
            self.steps_remaining = self.block_data.base_step_event_count() as f32;
            self.step_per_mm = self.steps_remaining / live.millimeters;
            self.req_mm_increment = REQ_MM_INCREMENT_SCALAR / self.step_per_mm;
            self.dt_remainder = 0.0;

            if control.execute_hold || self.flags.decel_override {
                // Loaded mid-deceleration: start where the last block left off
                self.ramp.current_speed = self.ramp.exit_speed;
                live.entry_speed_sqr = self.ramp.exit_speed * self.ramp.exit_speed;
                self.flags.decel_override = false;
            } else {
                self.ramp.current_speed = libm::sqrtf(live.entry_speed_sqr);
            }

            if spindle.is_rate_adjusted() && live.spindle == SpindleState::Ccw {
                self.inv_rate = 1.0 / live.programmed_rate;
                self.block_data.is_pwm_rate_adjusted = true;
            }

            out.store_block(self.block_index, self.block_data);
            debug!(
                "block loaded into slot {}: {} step events",
                self.block_index,
                self.block_data.step_event_count
            );
        }

        let block = *live;
        if control.execute_hold {
            self.ramp.plan_hold(&block);
        } else {
            let exit_speed_sqr = if control.execute_sys_motion {
                0.0
            } else {
                planner.exec_block_exit_speed_sqr()
            };
            let nominal_speed = planner.compute_profile_nominal_speed(&block);
            if self.ramp.plan_profile(&block, exit_speed_sqr, nominal_speed) {
                self.flags.decel_override = true;
            }
        }

        control.update_spindle_speed = true;
        self.block = Some(block);
        Some(block)
    }

    /// The planner changed the executing block: recompute its profile from
    /// the current speed on the next [`prep_buffer`](Self::prep_buffer).
    ///
    /// Ignored between blocks.
    pub fn update_plan_block_parameters<P: Planner + ?Sized>(&mut self, planner: &mut P) {
        if self.block.take().is_some() {
            self.flags.recalculate = true;
            let entry_speed_sqr = self.ramp.current_speed * self.ramp.current_speed;
            if let Some(live) = self.live_block(planner) {
                live.entry_speed_sqr = entry_speed_sqr;
            }
        }
    }

    /// Switch to preparing a parking motion, saving the held block's state.
    pub fn parking_setup_buffer(&mut self) {
        if self.flags.hold_partial_block {
            self.parked = Some(ParkedBlock {
                data: self.block_data,
                steps_remaining: self.steps_remaining,
                dt_remainder: self.dt_remainder,
                step_per_mm: self.step_per_mm,
            });
        }
        self.flags.parking = true;
        self.flags.recalculate = false;
        self.block = None;
        info!("parking: preparing system motion");
    }

    /// Return from parking, restoring the held block's state exactly.
    pub fn parking_restore_buffer(&mut self) {
        if self.flags.hold_partial_block {
            if let Some(parked) = self.parked.take() {
                self.block_data = parked.data;
                self.steps_remaining = parked.steps_remaining;
                self.dt_remainder = parked.dt_remainder;
                self.step_per_mm = parked.step_per_mm;
                self.restore_pending = true;
            }
            self.flags.parking = false;
            self.flags.hold_partial_block = true;
            self.flags.recalculate = true;
            self.req_mm_increment = REQ_MM_INCREMENT_SCALAR / self.step_per_mm;
            info!("parking: restored held block");
        } else {
            self.flags = PrepFlags::default();
            self.parked = None;
        }
        self.block = None;
    }

    /// Speed of the most recently prepared segment, mm/min.
    ///
    /// Lags the executing speed by up to the segment ring's depth.
    pub fn realtime_rate(&self, state: MachineState) -> f32 {
        if state.is_motion_bearing() {
            self.ramp.current_speed
        } else {
            0.0
        }
    }

    /// Forget all preparation state.
    pub fn reset(&mut self) {
        *self = Self::with_timing(
            self.n_axis,
            self.timer_hz,
            self.amass_threshold,
            self.dt_segment,
        );
    }

    /// Preparer flags.
    pub fn flags(&self) -> PrepFlags {
        self.flags
    }

    /// Velocity profile state.
    pub fn ramp(&self) -> &RampState {
        &self.ramp
    }

    /// Unrounded steps left in the block being prepared.
    pub fn steps_remaining(&self) -> f32 {
        self.steps_remaining
    }

    /// Time owed to the partial step at the last segment boundary, minutes.
    pub fn dt_remainder(&self) -> f32 {
        self.dt_remainder
    }

    /// Step density of the block being prepared.
    pub fn step_per_mm(&self) -> f32 {
        self.step_per_mm
    }

    /// Arena slot of the block being prepared.
    pub fn block_index(&self) -> u8 {
        self.block_index
    }

    /// A block is loaded and partly sliced.
    pub fn is_preparing(&self) -> bool {
        self.block.is_some()
    }

    /// Segment duration, minutes.
    pub fn dt_segment(&self) -> f32 {
        self.dt_segment
    }
}
