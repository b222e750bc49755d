//! Bit-banged shift-register engine.
//!
//! Clocks all 32 output bits through three dedicated pins on every change,
//! MSB first, then latches with a word-select edge. Step pulses are an XOR
//! mask over the idle word, timed with the same deadline/spin split as the
//! spin-wait engine.

use embedded_hal::delay::DelayNs;

use super::fifo::WORD_BITS;
use super::hal::{deadline_after, set_word_bit, spin_until, CycleClock, ShiftPort, StepTimer};
use super::{EngineState, EngineTiming, Lifecycle, StepEngine, StepPinHandle, StepPins, UnstepAction};
use crate::error::{EngineError, Error, Result};

/// Rate ceiling set by the per-pulse software overhead.
pub const SHIFTOUT_MAX_PPS: u32 = 150_000;

#[inline(always)]
fn one_clock<S: ShiftPort>(port: &mut S, data: u32) {
    port.set_bck(false);
    port.set_data(data & 0x8000_0000 != 0);
    port.set_bck(true);
}

/// Shift one word out MSB first and latch it.
pub fn shift_out<S: ShiftPort>(port: &mut S, word: u32) {
    port.set_ws(false);
    macro_rules! clocks {
        ($($bit:literal)*) => {
            $( one_clock(port, word << $bit); )*
        };
    }
    clocks!(0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31);
    port.set_ws(true);
}

/// Step engine bit-banging an external shift register.
pub struct ShiftOutEngine<S, T, C, D> {
    port: S,
    timer: T,
    clock: C,
    delay: D,
    output: u32,
    pulse: u32,
    pulse_us: u32,
    dir_delay_us: u32,
    pulse_end: u32,
    pins: StepPins,
    lifecycle: Lifecycle,
}

impl<S, T, C, D> ShiftOutEngine<S, T, C, D>
where
    S: ShiftPort,
    T: StepTimer,
    C: CycleClock,
    D: DelayNs,
{
    /// Create an engine over the shift pins, step timer, cycle counter and delay.
    pub fn new(port: S, timer: T, clock: C, delay: D) -> Self {
        Self {
            port,
            timer,
            clock,
            delay,
            output: 0,
            pulse: 0,
            pulse_us: 0,
            dir_delay_us: 0,
            pulse_end: 0,
            pins: StepPins::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Access the shift pins.
    pub fn port(&self) -> &S {
        &self.port
    }

    /// Idle output word.
    pub fn output(&self) -> u32 {
        self.output
    }
}

impl<S, T, C, D> StepEngine for ShiftOutEngine<S, T, C, D>
where
    S: ShiftPort,
    T: StepTimer,
    C: CycleClock,
    D: DelayNs,
{
    fn name(&self) -> &str {
        "shiftout"
    }

    fn init(&mut self, timing: EngineTiming) -> Result<u32> {
        self.pulse_us = timing.pulse_us.max(1);
        self.dir_delay_us = timing.dir_delay_us;
        self.timer.stop();
        shift_out(&mut self.port, self.output);
        self.lifecycle.initialized();
        Ok(self.pulse_us)
    }

    fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle> {
        self.lifecycle.require_init()?;
        if pin >= WORD_BITS {
            return Err(Error::Engine(EngineError::InvalidPin(pin)));
        }
        let handle = StepPinHandle::new(pin, inverted);
        self.pins.add(handle)?;
        set_word_bit(&mut self.output, pin, handle.level(false));
        shift_out(&mut self.port, self.output);
        Ok(handle)
    }

    fn set_dir_pin(&mut self, pin: u8, level: bool) {
        set_word_bit(&mut self.output, pin, level);
        shift_out(&mut self.port, self.output);
    }

    #[inline]
    fn finish_dir(&mut self) {
        if self.dir_delay_us > 0 {
            self.delay.delay_us(self.dir_delay_us);
        }
    }

    #[inline]
    fn start_step(&mut self) {
        self.pulse = 0;
    }

    // The pulse mask toggles the idle level, so inversion is already in `output`
    #[inline]
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
        set_word_bit(&mut self.pulse, pin.id(), active);
    }

    fn finish_step(&mut self) {
        self.pulse_end = deadline_after(&self.clock, self.pulse_us);
        shift_out(&mut self.port, self.output ^ self.pulse);
    }

    fn start_unstep(&mut self) -> UnstepAction {
        spin_until(&self.clock, self.pulse_end);
        shift_out(&mut self.port, self.output);
        self.pulse = 0;
        UnstepAction::Continue
    }

    #[inline]
    fn finish_unstep(&mut self) {}

    fn max_pulses_per_sec(&self) -> u32 {
        (1_000_000 / (2 * self.pulse_us.max(1))).min(SHIFTOUT_MAX_PPS)
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
        self.pulse = 0;
        for handle in self.pins.iter() {
            set_word_bit(&mut self.output, handle.id(), handle.level(false));
        }
        shift_out(&mut self.port, self.output);
        self.lifecycle.park();
    }
}
