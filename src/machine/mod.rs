//! Collaborators the motion core consumes, and the flags it shares with the
//! surrounding controller.
//!
//! Everything here is an interface: the planner, spindle, probe and motor
//! drivers live outside this crate.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::motion::PlannerBlock;

/// Source of trajectory blocks.
pub trait Planner {
    /// Block at the head of the planner queue.
    fn current_block(&mut self) -> Option<&mut PlannerBlock>;

    /// Dedicated single block for homing or parking motions.
    fn system_motion_block(&mut self) -> Option<&mut PlannerBlock>;

    /// Drop the head block; the preparer has queued all of its steps.
    fn discard_current_block(&mut self);

    /// Exit speed squared of the block being executed.
    fn exec_block_exit_speed_sqr(&self) -> f32;

    /// Nominal speed of a block with overrides applied.
    fn compute_profile_nominal_speed(&self, block: &PlannerBlock) -> f32;
}

/// Spindle or laser output.
///
/// `set_speed_from_isr` runs in interrupt context while `map_speed` runs in
/// background context, so both take `&self`.
pub trait Spindle {
    /// Convert a commanded speed into the device's output word.
    fn map_speed(&self, speed: f32) -> u32;

    /// Apply a device output word. Called from interrupt context.
    fn set_speed_from_isr(&self, dev_speed: u32);

    /// Output power tracks the executing feed rate (laser mode).
    fn is_rate_adjusted(&self) -> bool {
        false
    }
}

/// Probe input.
pub trait Probe {
    /// Probe contact is made. Called from interrupt context.
    fn tripped(&self) -> bool;
}

/// Motor driver enable lines.
pub trait MotorDrivers {
    /// Disable (`true`) or enable (`false`) all motor drivers.
    fn set_disable(&mut self, disable: bool);
}

/// Step-control flags shared between the protocol loop and the preparer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepControl {
    /// Preparation is blocked until the controller clears this
    pub end_motion: bool,
    /// A feed hold is decelerating the machine
    pub execute_hold: bool,
    /// Prepare from the system-motion block instead of the planner queue
    pub execute_sys_motion: bool,
    /// Recompute the spindle output for the next segment
    pub update_spindle_speed: bool,
}

/// Signals raised from interrupt context.
///
/// Taking a signal is a single `swap` where the target has atomic
/// read-modify-write. Elsewhere it is a load then a store, and a raise that
/// lands between the two merges with the one being taken. The executor only
/// raises again after the background has restarted motion, so no stop or
/// cancel is lost either way.
#[derive(Debug, Default)]
pub struct Signals {
    cycle_stop: AtomicBool,
    motion_cancel: AtomicBool,
    probe_armed: AtomicBool,
    isr_count: AtomicU32,
}

impl Signals {
    /// Create with both signals clear.
    pub const fn new() -> Self {
        Self {
            cycle_stop: AtomicBool::new(false),
            motion_cancel: AtomicBool::new(false),
            probe_armed: AtomicBool::new(false),
            isr_count: AtomicU32::new(0),
        }
    }

    pub(crate) fn raise_cycle_stop(&self) {
        self.cycle_stop.store(true, Ordering::Release);
    }

    pub(crate) fn raise_motion_cancel(&self) {
        self.motion_cancel.store(true, Ordering::Release);
    }

    /// Check the cycle-stop signal without clearing it.
    pub fn cycle_stop(&self) -> bool {
        self.cycle_stop.load(Ordering::Acquire)
    }

    /// Check the motion-cancel signal without clearing it.
    pub fn motion_cancel(&self) -> bool {
        self.motion_cancel.load(Ordering::Acquire)
    }

    /// Read and clear the cycle-stop signal.
    pub fn take_cycle_stop(&self) -> bool {
        take(&self.cycle_stop)
    }

    /// Read and clear the motion-cancel signal.
    pub fn take_motion_cancel(&self) -> bool {
        take(&self.motion_cancel)
    }

    /// Clear both signals.
    pub fn clear(&self) {
        self.cycle_stop.store(false, Ordering::Release);
        self.motion_cancel.store(false, Ordering::Release);
    }

    /// Latch motor positions on the next probe trip.
    pub fn arm_probe(&self) {
        self.probe_armed.store(true, Ordering::Release);
    }

    /// Cancel a pending probe latch.
    pub fn disarm_probe(&self) {
        self.probe_armed.store(false, Ordering::Release);
    }

    /// Probe latch is pending.
    pub fn probe_armed(&self) -> bool {
        self.probe_armed.load(Ordering::Acquire)
    }

    /// Pulse executor invocations since the last reset.
    pub fn isr_count(&self) -> u32 {
        self.isr_count.load(Ordering::Relaxed)
    }

    // Single writer: the executor.
    pub(crate) fn count_isr(&self) {
        let n = self.isr_count.load(Ordering::Relaxed);
        self.isr_count.store(n.wrapping_add(1), Ordering::Relaxed);
    }

    pub(crate) fn reset_isr_count(&self) {
        self.isr_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(target_has_atomic = "8")]
#[inline]
fn take(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::AcqRel)
}

#[cfg(not(target_has_atomic = "8"))]
#[inline]
fn take(flag: &AtomicBool) -> bool {
    let raised = flag.load(Ordering::Acquire);
    if raised {
        flag.store(false, Ordering::Release);
    }
    raised
}

/// Controller state, used only to gate realtime rate reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineState {
    /// Nothing running
    #[default]
    Idle,
    /// Alarm lockout
    Alarm,
    /// G-code check mode
    CheckMode,
    /// Homing cycle
    Homing,
    /// Executing motion
    Cycle,
    /// Feed hold
    Hold,
    /// Jogging
    Jog,
    /// Safety door open
    SafetyDoor,
    /// Sleeping
    Sleep,
}

impl MachineState {
    /// States in which the preparer's speed reflects real motion.
    pub fn is_motion_bearing(self) -> bool {
        matches!(
            self,
            MachineState::Cycle
                | MachineState::Homing
                | MachineState::Hold
                | MachineState::Jog
                | MachineState::SafetyDoor
        )
    }
}
