//! Spin-wait GPIO engine.
//!
//! Pins are written directly. `finish_step` only records when the pulse may
//! end; `start_unstep` spins until then, so the pulse width overlaps the
//! executor's Bresenham work for the next tick.

use embedded_hal::delay::DelayNs;

use super::hal::{deadline_after, spin_until, CycleClock, PinPort, StepTimer};
use super::{EngineState, EngineTiming, Lifecycle, StepEngine, StepPinHandle, StepPins, UnstepAction};
use crate::error::{EngineError, Error, Result};

/// Step engine toggling GPIO pins with spin-wait pulse timing.
pub struct TimedEngine<P, T, C, D> {
    port: P,
    timer: T,
    clock: C,
    delay: D,
    pulse_us: u32,
    dir_delay_us: u32,
    pulse_end: u32,
    pins: StepPins,
    lifecycle: Lifecycle,
}

impl<P, T, C, D> TimedEngine<P, T, C, D>
where
    P: PinPort,
    T: StepTimer,
    C: CycleClock,
    D: DelayNs,
{
    /// Create an engine over a GPIO port, step timer, cycle counter and delay.
    pub fn new(port: P, timer: T, clock: C, delay: D) -> Self {
        Self {
            port,
            timer,
            clock,
            delay,
            pulse_us: 0,
            dir_delay_us: 0,
            pulse_end: 0,
            pins: StepPins::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Access the GPIO port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Access the step timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }
}

impl<P, T, C, D> StepEngine for TimedEngine<P, T, C, D>
where
    P: PinPort,
    T: StepTimer,
    C: CycleClock,
    D: DelayNs,
{
    fn name(&self) -> &str {
        "timed"
    }

    fn init(&mut self, timing: EngineTiming) -> Result<u32> {
        self.pulse_us = timing.pulse_us.max(1);
        self.dir_delay_us = timing.dir_delay_us;
        self.timer.stop();
        self.lifecycle.initialized();
        Ok(self.pulse_us)
    }

    fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle> {
        self.lifecycle.require_init()?;
        if pin >= self.port.pin_count() {
            return Err(Error::Engine(EngineError::InvalidPin(pin)));
        }
        let handle = StepPinHandle::new(pin, inverted);
        self.pins.add(handle)?;
        self.port.write(pin, handle.level(false));
        Ok(handle)
    }

    #[inline]
    fn set_dir_pin(&mut self, pin: u8, level: bool) {
        self.port.write(pin, level);
    }

    #[inline]
    fn finish_dir(&mut self) {
        if self.dir_delay_us > 0 {
            self.delay.delay_us(self.dir_delay_us);
        }
    }

    #[inline]
    fn start_step(&mut self) {}

    #[inline]
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
        self.port.write(pin.id(), pin.level(active));
    }

    #[inline]
    fn finish_step(&mut self) {
        self.pulse_end = deadline_after(&self.clock, self.pulse_us);
    }

    #[inline]
    fn start_unstep(&mut self) -> UnstepAction {
        spin_until(&self.clock, self.pulse_end);
        UnstepAction::Continue
    }

    // Each GPIO write takes effect immediately
    #[inline]
    fn finish_unstep(&mut self) {}

    fn max_pulses_per_sec(&self) -> u32 {
        1_000_000 / (2 * self.pulse_us.max(1))
    }

    #[inline]
    fn set_timer_ticks(&mut self, ticks: u32) {
        self.timer.set_period_ticks(ticks);
    }

    fn start_timer(&mut self) {
        self.timer.start();
        self.lifecycle.start();
    }

    fn stop_timer(&mut self) {
        self.timer.stop();
        self.lifecycle.stop();
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn park(&mut self) {
        self.timer.stop();
        for handle in self.pins.iter() {
            self.port.write(handle.id(), handle.level(false));
        }
        self.lifecycle.park();
    }
}
