//! Velocity profile classification and the per-segment ramp walk.
//!
//! Distances are measured backward from the end of the block: a block starts
//! at `millimeters` and ends at `0.0` (or at `mm_complete` for a forced
//! deceleration that stops inside the block).

use super::block::PlannerBlock;

/// Phase of the ramp state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampPhase {
    /// Speeding up toward `maximum_speed`
    #[default]
    Accelerate,
    /// Constant `maximum_speed`
    Cruise,
    /// Slowing toward `exit_speed`
    Decelerate,
    /// Slowing from above nominal down to a new, lower nominal speed
    DecelerateOverride,
}

/// Preparer flags governing block reload and resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrepFlags {
    /// Recompute the profile of the cached block without reloading its
    /// Bresenham data
    pub recalculate: bool,
    /// A forced deceleration stopped inside the block; resume from saved state
    pub hold_partial_block: bool,
    /// A parking motion is being prepared
    pub parking: bool,
    /// The next block starts at the previous block's exit speed
    pub decel_override: bool,
}

/// Ramp distance and time covered by one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentTravel {
    /// Elapsed ramp time, minutes
    pub dt: f32,
    /// Distance left to the end of the block after this segment, mm
    pub mm_remaining: f32,
}

/// Velocity profile of the block being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RampState {
    /// Current ramp phase
    pub phase: RampPhase,
    /// Speed at the end of the last prepared segment, mm/min
    pub current_speed: f32,
    /// Peak speed of this profile, mm/min
    pub maximum_speed: f32,
    /// Speed at the profile end, mm/min
    pub exit_speed: f32,
    /// Acceleration ends this far from the block end, mm
    pub accelerate_until: f32,
    /// Deceleration starts this far from the block end, mm
    pub decelerate_after: f32,
    /// Profile ends this far from the block end, mm; nonzero only for a
    /// forced deceleration that stops inside the block
    pub mm_complete: f32,
}

impl RampState {
    /// Profile for a feed hold: decelerate to zero as soon as possible.
    ///
    /// When the block is too short to stop, the profile runs through the whole
    /// block and exits at `sqrt(v0^2 - 2*a*d)`.
    pub fn plan_hold(&mut self, block: &PlannerBlock) {
        let inv_2_accel = 0.5 / block.acceleration;
        self.mm_complete = 0.0;
        self.phase = RampPhase::Decelerate;
        self.maximum_speed = self.current_speed;

        let decel_dist = block.millimeters - inv_2_accel * block.entry_speed_sqr;
        if decel_dist < 0.0 {
            self.exit_speed = libm::sqrtf(
                block.entry_speed_sqr - 2.0 * block.acceleration * block.millimeters,
            );
        } else {
            self.mm_complete = decel_dist;
            self.exit_speed = 0.0;
        }
    }

    /// Classify the normal profile of a block.
    ///
    /// Returns `true` when the block is a deceleration-only override, in which
    /// case the following block must start at this block's exit speed.
    pub fn plan_profile(&mut self, block: &PlannerBlock, exit_speed_sqr: f32, nominal_speed: f32) -> bool {
        let inv_2_accel = 0.5 / block.acceleration;
        let mut decel_override = false;

        self.mm_complete = 0.0;
        self.phase = RampPhase::Accelerate;
        self.accelerate_until = block.millimeters;
        self.exit_speed = libm::sqrtf(exit_speed_sqr);

        let nominal_speed_sqr = nominal_speed * nominal_speed;
        let intersect_distance =
            0.5 * (block.millimeters + inv_2_accel * (block.entry_speed_sqr - exit_speed_sqr));

        if block.entry_speed_sqr > nominal_speed_sqr {
            // Entry above nominal only happens right after an override reduction.
            self.accelerate_until =
                block.millimeters - inv_2_accel * (block.entry_speed_sqr - nominal_speed_sqr);
            if self.accelerate_until <= 0.0 {
                self.phase = RampPhase::Decelerate;
                self.maximum_speed = self.current_speed;
                self.exit_speed = libm::sqrtf(
                    block.entry_speed_sqr - 2.0 * block.acceleration * block.millimeters,
                );
                decel_override = true;
            } else {
                self.decelerate_after = inv_2_accel * (nominal_speed_sqr - exit_speed_sqr);
                self.maximum_speed = nominal_speed;
                self.phase = RampPhase::DecelerateOverride;
            }
        } else if intersect_distance > 0.0 {
            if intersect_distance < block.millimeters {
                self.decelerate_after = inv_2_accel * (nominal_speed_sqr - exit_speed_sqr);
                if self.decelerate_after < intersect_distance {
                    // Trapezoid
                    self.maximum_speed = nominal_speed;
                    if block.entry_speed_sqr == nominal_speed_sqr {
                        self.phase = RampPhase::Cruise;
                    } else {
                        self.accelerate_until -=
                            inv_2_accel * (nominal_speed_sqr - block.entry_speed_sqr);
                    }
                } else {
                    // Triangle
                    self.accelerate_until = intersect_distance;
                    self.decelerate_after = intersect_distance;
                    self.maximum_speed = libm::sqrtf(
                        2.0 * block.acceleration * intersect_distance + exit_speed_sqr,
                    );
                }
            } else {
                // Deceleration only
                self.phase = RampPhase::Decelerate;
                self.maximum_speed = self.current_speed;
            }
        } else {
            // Acceleration only
            self.accelerate_until = 0.0;
            self.maximum_speed = self.exit_speed;
        }

        decel_override
    }

    /// Walk the ramp for one segment.
    ///
    /// Consumes `dt_segment` minutes of ramp time, crossing phase boundaries as
    /// needed. If the distance covered would not reach `min_mm_increment` the
    /// budget grows in `dt_segment` steps until it does or the profile ends.
    pub fn advance_segment(
        &mut self,
        block: &PlannerBlock,
        min_mm_increment: f32,
        dt_segment: f32,
    ) -> SegmentTravel {
        let mut dt_max = dt_segment;
        let mut dt = 0.0f32;
        let mut time_var = dt_max;
        let mut mm_remaining = block.millimeters;
        let minimum_mm = (mm_remaining - min_mm_increment).max(0.0);

        loop {
            match self.phase {
                RampPhase::DecelerateOverride => {
                    let speed_var = block.acceleration * time_var;
                    let mm_var = time_var * (self.current_speed - 0.5 * speed_var);
                    mm_remaining -= mm_var;
                    if mm_remaining < self.accelerate_until || mm_var <= 0.0 {
                        mm_remaining = self.accelerate_until;
                        time_var = 2.0 * (block.millimeters - mm_remaining)
                            / (self.current_speed + self.maximum_speed);
                        self.phase = RampPhase::Cruise;
                        self.current_speed = self.maximum_speed;
                    } else {
                        self.current_speed -= speed_var;
                    }
                }
                RampPhase::Accelerate => {
                    let speed_var = block.acceleration * time_var;
                    mm_remaining -= time_var * (self.current_speed + 0.5 * speed_var);
                    if mm_remaining < self.accelerate_until {
                        mm_remaining = self.accelerate_until;
                        time_var = 2.0 * (block.millimeters - mm_remaining)
                            / (self.current_speed + self.maximum_speed);
                        self.phase = if mm_remaining == self.decelerate_after {
                            RampPhase::Decelerate
                        } else {
                            RampPhase::Cruise
                        };
                        self.current_speed = self.maximum_speed;
                    } else {
                        self.current_speed += speed_var;
                    }
                }
                RampPhase::Cruise => {
                    let mm_var = mm_remaining - self.maximum_speed * time_var;
                    if mm_var < self.decelerate_after {
                        time_var = (mm_remaining - self.decelerate_after) / self.maximum_speed;
                        mm_remaining = self.decelerate_after;
                        self.phase = RampPhase::Decelerate;
                    } else {
                        mm_remaining = mm_var;
                    }
                }
                RampPhase::Decelerate => {
                    let speed_var = block.acceleration * time_var;
                    let mut in_ramp = false;
                    if self.current_speed > speed_var {
                        let mm_var =
                            mm_remaining - time_var * (self.current_speed - 0.5 * speed_var);
                        if mm_var > self.mm_complete {
                            mm_remaining = mm_var;
                            self.current_speed -= speed_var;
                            in_ramp = true;
                        }
                    }
                    if !in_ramp {
                        // End of block or end of forced deceleration
                        time_var = 2.0 * (mm_remaining - self.mm_complete)
                            / (self.current_speed + self.exit_speed);
                        mm_remaining = self.mm_complete;
                        self.current_speed = self.exit_speed;
                    }
                }
            }

            dt += time_var;
            if dt < dt_max {
                time_var = dt_max - dt;
            } else if mm_remaining > minimum_mm {
                dt_max += dt_segment;
                time_var = dt_max - dt;
            } else {
                break;
            }

            if mm_remaining <= self.mm_complete {
                break;
            }
        }

        SegmentTravel { dt, mm_remaining }
    }
}
