//! Step engines: the hardware strategies that turn logical step/direction
//! requests into electrical pulses.
//!
//! The pulse executor only ever talks to a [`StepEngine`]. Each tick it:
//!
//! 1. sets direction pins and commits them with [`StepEngine::finish_dir`]
//!    (only when the direction pattern changed),
//! 2. brackets step assertions with [`StepEngine::start_step`] and
//!    [`StepEngine::finish_step`],
//! 3. brackets deassertions with [`StepEngine::start_unstep`] and
//!    [`StepEngine::finish_unstep`], skipping the deassertion when the engine
//!    reports [`UnstepAction::Skip`].
//!
//! Engines may return from `finish_step` immediately and do the pulse-width
//! wait in `start_unstep`, overlapping it with the executor's Bresenham work.

pub mod fifo;
pub mod hal;
mod registry;
pub mod replay;
pub mod shiftout;
pub mod timed;

pub use registry::EngineRegistry;

use crate::error::{EngineError, Error, Result};
use crate::motion::MAX_AXES;

/// Timing requested at engine initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineTiming {
    /// Settle time after a direction change, microseconds
    pub dir_delay_us: u32,
    /// Step pulse width, microseconds
    pub pulse_us: u32,
    /// Step timer tick frequency, Hz
    pub frequency_hz: u32,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            dir_delay_us: 0,
            pulse_us: 4,
            frequency_hz: 20_000_000,
        }
    }
}

/// Opaque reference to a step output returned by [`StepEngine::init_step_pin`].
///
/// `id` is a GPIO number for most engines and a channel number for the
/// pulse-replay engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepPinHandle {
    id: u8,
    inverted: bool,
}

impl StepPinHandle {
    /// Create a handle.
    pub const fn new(id: u8, inverted: bool) -> Self {
        Self { id, inverted }
    }

    /// Engine-specific pin or channel number.
    #[inline]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Pin idles high.
    #[inline]
    pub const fn inverted(&self) -> bool {
        self.inverted
    }

    /// Electrical level for a logical step state.
    #[inline]
    pub const fn level(&self, active: bool) -> bool {
        active != self.inverted
    }
}

/// What the executor does after [`StepEngine::start_unstep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnstepAction {
    /// Deassert each step pin, then call `finish_unstep`
    Continue,
    /// The engine ends pulses itself; skip deassertion
    Skip,
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    /// `init` not called yet
    #[default]
    Uninitialized,
    /// Pins attached, timer configured but stopped
    Initialized,
    /// Timer active, pulses flowing
    Running,
    /// Timer halted and outputs parked after a reset or fault
    Stopped,
}

/// Lifecycle tracker shared by the engine implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    state: EngineState,
}

impl Lifecycle {
    /// Current state.
    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Timer is running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    /// Enter `Initialized` after `init`.
    pub fn initialized(&mut self) {
        self.state = EngineState::Initialized;
    }

    /// Fail unless `init` has run.
    pub fn require_init(&self) -> Result<()> {
        if self.state == EngineState::Uninitialized {
            return Err(Error::Engine(EngineError::NotInitialized));
        }
        Ok(())
    }

    /// Timer started. Ignored before `init`.
    pub fn start(&mut self) {
        if self.state != EngineState::Uninitialized {
            self.state = EngineState::Running;
        }
    }

    /// Timer stopped.
    pub fn stop(&mut self) {
        if self.state == EngineState::Running {
            self.state = EngineState::Initialized;
        }
    }

    /// Reset or fault: force `Stopped`.
    pub fn park(&mut self) {
        if self.state != EngineState::Uninitialized {
            self.state = EngineState::Stopped;
        }
    }
}

/// Step pins registered with an engine, kept for parking outputs.
#[derive(Debug, Clone, Default)]
pub struct StepPins {
    handles: heapless::Vec<StepPinHandle, MAX_AXES>,
}

impl StepPins {
    /// Record a newly registered pin.
    pub fn add(&mut self, handle: StepPinHandle) -> Result<()> {
        self.handles
            .push(handle)
            .map_err(|_| Error::Engine(EngineError::NoFreeChannel))
    }

    /// Registered pins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &StepPinHandle> {
        self.handles.iter()
    }

    /// Number of registered pins.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if no pins are registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Capability set every step engine implements.
///
/// Methods other than `init`, `init_step_pin`, `park` and `name` run in
/// interrupt context: they must not block beyond the configured pulse and
/// direction delays, and must not allocate.
pub trait StepEngine {
    /// Name used for selection at configuration time.
    fn name(&self) -> &str;

    /// Configure timing. Returns the pulse width the engine will actually
    /// produce, which may be coarser than requested.
    fn init(&mut self, timing: EngineTiming) -> Result<u32>;

    /// Attach a step output.
    fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle>;

    /// Set a direction pin's electrical level.
    fn set_dir_pin(&mut self, pin: u8, level: bool);

    /// Commit direction changes and wait out the direction delay.
    fn finish_dir(&mut self);

    /// Begin a step cycle.
    fn start_step(&mut self);

    /// Assert or deassert a step output.
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool);

    /// Commit step assertions.
    fn finish_step(&mut self);

    /// Begin deassertion, waiting out the pulse width if still pending.
    fn start_unstep(&mut self) -> UnstepAction;

    /// Commit deassertions.
    fn finish_unstep(&mut self);

    /// Highest sustainable step rate for the configured timing.
    fn max_pulses_per_sec(&self) -> u32;

    /// Timer ticks until the next pulse event.
    fn set_timer_ticks(&mut self, ticks: u32);

    /// Start the pulse event timer.
    fn start_timer(&mut self);

    /// Stop the pulse event timer.
    fn stop_timer(&mut self);

    /// Lifecycle state.
    fn state(&self) -> EngineState;

    /// Stop the timer and drive every step output to its idle level.
    fn park(&mut self);

    /// Switch into or out of low-latency output, where each step reaches the
    /// pins within its executor tick. Returns `true` if the mode changed.
    ///
    /// Background context only. A running engine is stopped first. Engines
    /// whose output is always immediate ignore this.
    fn set_low_latency(&mut self, enabled: bool) -> bool {
        let _ = enabled;
        false
    }

    /// Second interrupt entry point for engines that generate pulses from a
    /// FIFO refill interrupt.
    ///
    /// The engine calls `pulse` each time it needs the next tick's pin
    /// pattern, passing itself so the executor can drive it. Engines driven
    /// by a plain timer leave this as a no-op.
    fn service_refill(&mut self, pulse: &mut dyn FnMut(&mut dyn StepEngine)) {
        let _ = pulse;
    }
}

impl<E: StepEngine + ?Sized> StepEngine for &mut E {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn init(&mut self, timing: EngineTiming) -> Result<u32> {
        (**self).init(timing)
    }

    fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle> {
        (**self).init_step_pin(pin, inverted)
    }

    #[inline]
    fn set_dir_pin(&mut self, pin: u8, level: bool) {
        (**self).set_dir_pin(pin, level)
    }

    #[inline]
    fn finish_dir(&mut self) {
        (**self).finish_dir()
    }

    #[inline]
    fn start_step(&mut self) {
        (**self).start_step()
    }

    #[inline]
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
        (**self).set_step_pin(pin, active)
    }

    #[inline]
    fn finish_step(&mut self) {
        (**self).finish_step()
    }

    #[inline]
    fn start_unstep(&mut self) -> UnstepAction {
        (**self).start_unstep()
    }

    #[inline]
    fn finish_unstep(&mut self) {
        (**self).finish_unstep()
    }

    fn max_pulses_per_sec(&self) -> u32 {
        (**self).max_pulses_per_sec()
    }

    #[inline]
    fn set_timer_ticks(&mut self, ticks: u32) {
        (**self).set_timer_ticks(ticks)
    }

    #[inline]
    fn start_timer(&mut self) {
        (**self).start_timer()
    }

    #[inline]
    fn stop_timer(&mut self) {
        (**self).stop_timer()
    }

    fn state(&self) -> EngineState {
        (**self).state()
    }

    fn park(&mut self) {
        (**self).park()
    }

    fn set_low_latency(&mut self, enabled: bool) -> bool {
        (**self).set_low_latency(enabled)
    }

    fn service_refill(&mut self, pulse: &mut dyn FnMut(&mut dyn StepEngine)) {
        (**self).service_refill(pulse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_level() {
        let normal = StepPinHandle::new(3, false);
        let inverted = StepPinHandle::new(3, true);
        assert!(normal.level(true));
        assert!(!normal.level(false));
        assert!(!inverted.level(true));
        assert!(inverted.level(false));
        assert_eq!(normal.id(), 3);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut life = Lifecycle::default();
        assert!(life.require_init().is_err());
        life.start();
        assert_eq!(life.state(), EngineState::Uninitialized);

        life.initialized();
        life.start();
        assert!(life.is_running());
        life.stop();
        assert_eq!(life.state(), EngineState::Initialized);

        life.start();
        life.park();
        assert_eq!(life.state(), EngineState::Stopped);
        life.stop();
        assert_eq!(life.state(), EngineState::Stopped);
        life.start();
        assert!(life.is_running());
    }

    #[test]
    fn test_step_pins_capacity() {
        let mut pins = StepPins::default();
        for id in 0..MAX_AXES as u8 {
            pins.add(StepPinHandle::new(id, false)).unwrap();
        }
        assert_eq!(pins.len(), MAX_AXES);
        assert_eq!(
            pins.add(StepPinHandle::new(9, false)),
            Err(Error::Engine(EngineError::NoFreeChannel))
        );
    }
}
