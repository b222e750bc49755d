//! Data carried from the planner through the segment ring to the executor.

/// Maximum number of axes the core can drive.
pub const MAX_AXES: usize = 6;

/// Highest AMASS level. Each level doubles Bresenham resolution.
pub const MAX_AMASS_LEVEL: u8 = 3;

/// Largest step count a block carries into the executor. Longer moves are
/// clamped so scaled counts and Bresenham counters fit a `u32`.
pub const MAX_BLOCK_STEPS: u32 = u32::MAX >> (MAX_AMASS_LEVEL + 1);

/// Bit mask with one bit per axis, bit 0 = first axis.
pub type AxisMask = u8;

/// Spindle direction/enable state attached to a planner block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpindleState {
    /// Spindle off
    #[default]
    Disable,
    /// Clockwise
    Cw,
    /// Counter-clockwise; with a rate-adjusted (laser) spindle this selects
    /// dynamic power tracking the executing speed
    Ccw,
}

/// Motion flags attached to a planner block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlMotion {
    /// Block comes from the system-motion source (homing, parking)
    pub system_motion: bool,
    /// Rapid traverse
    pub rapid_motion: bool,
    /// Feed overrides do not apply
    pub no_feed_override: bool,
}

/// A trajectory block as produced by the planner.
///
/// Units are millimeters and mm/min. The core reads the block and writes back
/// only `millimeters` (distance left) and `entry_speed_sqr`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlannerBlock {
    /// Step count per axis for the whole block
    pub steps: [u32; MAX_AXES],
    /// Steps of the dominant axis
    pub step_event_count: u32,
    /// Direction bits; a set bit moves that axis in the negative direction
    pub direction_bits: AxisMask,
    /// Entry speed squared, (mm/min)^2
    pub entry_speed_sqr: f32,
    /// Acceleration, mm/min^2
    pub acceleration: f32,
    /// Distance left to execute, mm
    pub millimeters: f32,
    /// Programmed feed rate, mm/min
    pub programmed_rate: f32,
    /// Nominal speed before overrides, mm/min
    pub nominal_speed: f32,
    /// Spindle state
    pub spindle: SpindleState,
    /// Commanded spindle speed
    pub spindle_speed: f32,
    /// Source line number
    pub line_number: i32,
    /// Motion flags
    pub motion: PlMotion,
}

impl PlannerBlock {
    /// Build a block from signed per-axis step deltas.
    ///
    /// Fills `steps`, `direction_bits` and `step_event_count`; speeds start at
    /// zero entry with the given acceleration and feed rate.
    pub fn from_deltas(deltas: &[i32], millimeters: f32, acceleration: f32, rate: f32) -> Self {
        let mut block = Self {
            millimeters,
            acceleration,
            programmed_rate: rate,
            nominal_speed: rate,
            ..Default::default()
        };
        for (axis, &delta) in deltas.iter().take(MAX_AXES).enumerate() {
            block.steps[axis] = delta.unsigned_abs();
            if delta < 0 {
                block.direction_bits |= 1 << axis;
            }
            block.step_event_count = block.step_event_count.max(block.steps[axis]);
        }
        block
    }

    /// Set the entry speed (mm/min).
    pub fn with_entry_speed(mut self, speed: f32) -> Self {
        self.entry_speed_sqr = speed * speed;
        self
    }

    /// Set spindle state and commanded speed.
    pub fn with_spindle(mut self, state: SpindleState, speed: f32) -> Self {
        self.spindle = state;
        self.spindle_speed = speed;
        self
    }

    /// Mark as a system motion.
    pub fn as_system_motion(mut self) -> Self {
        self.motion.system_motion = true;
        self
    }
}

/// Bresenham data for one in-flight block.
///
/// Counts are scaled by `2^MAX_AMASS_LEVEL` so per-segment right shifts never
/// drop a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepperBlockData {
    /// AMASS-scaled per-axis step counts
    pub steps: [u32; MAX_AXES],
    /// AMASS-scaled step event count
    pub step_event_count: u32,
    /// Direction bits copied from the planner block
    pub direction_bits: AxisMask,
    /// Spindle output tracks executing speed (laser mode)
    pub is_pwm_rate_adjusted: bool,
}

impl StepperBlockData {
    /// Derive block data for the first `n_axis` axes of a planner block.
    ///
    /// Step counts above [`MAX_BLOCK_STEPS`] are clamped.
    pub fn from_planner(block: &PlannerBlock, n_axis: usize) -> Self {
        let scale = |steps: u32| steps.min(MAX_BLOCK_STEPS) << MAX_AMASS_LEVEL;
        let mut data = Self {
            step_event_count: scale(block.step_event_count),
            direction_bits: block.direction_bits,
            ..Default::default()
        };
        for (scaled, &steps) in data.steps.iter_mut().zip(block.steps.iter()).take(n_axis) {
            *scaled = scale(steps);
        }
        data
    }

    /// Step events of the block before AMASS scaling.
    pub fn base_step_event_count(&self) -> u32 {
        self.step_event_count >> MAX_AMASS_LEVEL
    }
}

/// One execution quantum of the segment ring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Segment {
    /// Step events to execute, already scaled by the AMASS level
    pub n_step: u32,
    /// Timer ticks between interrupts
    pub isr_period: u16,
    /// Arena index of the block this segment belongs to
    pub block_index: u8,
    /// AMASS level applied
    pub amass_level: u8,
    /// Spindle speed in command units
    pub spindle_speed: f32,
    /// Spindle speed mapped to the output device
    pub spindle_dev_speed: u32,
}

impl Segment {
    /// Step events at AMASS level 0.
    #[inline]
    pub fn base_steps(&self) -> u32 {
        self.n_step >> self.amass_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_deltas() {
        let block = PlannerBlock::from_deltas(&[100, -40, 0], 1.0, 1000.0, 600.0);
        assert_eq!(block.steps[..3], [100, 40, 0]);
        assert_eq!(block.direction_bits, 0b010);
        assert_eq!(block.step_event_count, 100);
    }

    #[test]
    fn test_block_data_is_amass_scaled() {
        let block = PlannerBlock::from_deltas(&[100, 3], 1.0, 1000.0, 600.0);
        let data = StepperBlockData::from_planner(&block, 2);
        assert_eq!(data.step_event_count, 800);
        assert_eq!(data.steps[0], 800);
        assert_eq!(data.steps[1], 24);
        assert_eq!(data.direction_bits, 0);
    }

    #[test]
    fn test_block_data_clamps_oversized_counts() {
        let mut block = PlannerBlock::from_deltas(&[10, 4], 1.0, 1000.0, 600.0);
        block.step_event_count = 1 << 30;
        block.steps[0] = 1 << 30;
        let data = StepperBlockData::from_planner(&block, 2);
        assert_eq!(data.base_step_event_count(), MAX_BLOCK_STEPS);
        assert_eq!(data.steps[0], data.step_event_count);
        assert_eq!(data.steps[1], 32);
        // Counter headroom: one full step added to a full counter still fits
        assert!(data.step_event_count.checked_mul(2).is_some());
    }

    #[test]
    fn test_block_data_ignores_inactive_axes() {
        let block = PlannerBlock::from_deltas(&[10, 20, 30], 1.0, 1000.0, 600.0);
        let data = StepperBlockData::from_planner(&block, 2);
        assert_eq!(data.steps[2], 0);
    }

    #[test]
    fn test_segment_base_steps() {
        let segment = Segment {
            n_step: 24,
            amass_level: 3,
            ..Default::default()
        };
        assert_eq!(segment.base_steps(), 3);
    }
}
