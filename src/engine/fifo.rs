//! FIFO-fed serial shift-register engines.
//!
//! All step and direction outputs are bits of one 32-bit word that a serial
//! peripheral shifts out to an external register, one word per frame. Pulse
//! widths are therefore whole frames.
//!
//! Two timing policies:
//!
//! - [`FifoEngine`]: a normal step timer runs the executor; `finish_step`
//!   pushes `pulse_counts` copies of the stepped word followed by one idle
//!   word.
//! - [`FifoStreamEngine`]: the FIFO's low-watermark interrupt refills it
//!   with pulse and idle frames and calls back into the executor whenever a
//!   tick's frames are used up. The timer period becomes a count of idle
//!   frames. A low-latency mode falls back to the direct-push policy.

use embedded_hal::delay::DelayNs;

use super::hal::{set_word_bit, SampleFifo, StepTimer};
use super::{EngineState, EngineTiming, Lifecycle, StepEngine, StepPinHandle, StepPins, UnstepAction};
use crate::error::{EngineError, Error, Result};

/// Longest pulse the FIFO engines produce, microseconds.
pub const FIFO_MAX_PULSE_US: u32 = 20;

/// Frames pushed per refill interrupt.
pub const FIFO_RELOAD: u32 = 8;

/// Bits in the output word.
pub const WORD_BITS: u8 = 32;

/// Pulse width rounded up to whole frames and clamped.
///
/// Returns `(pulse_counts, actual_pulse_us)`.
pub fn pulse_frames(pulse_us: u32, frame_us: u32) -> (u32, u32) {
    let frame_us = frame_us.max(1);
    let pulse_us = pulse_us.clamp(frame_us, FIFO_MAX_PULSE_US.max(frame_us));
    let counts = (pulse_us + frame_us - 1) / frame_us;
    (counts, counts * frame_us)
}

fn check_pin(pin: u8) -> Result<()> {
    if pin >= WORD_BITS {
        return Err(Error::Engine(EngineError::InvalidPin(pin)));
    }
    Ok(())
}

/// Shift-register engine pushing whole pulses from `finish_step`.
pub struct FifoEngine<F, T, D> {
    fifo: F,
    timer: T,
    delay: D,
    port_data: u32,
    new_port_data: u32,
    pulse_counts: u32,
    frame_us: u32,
    dir_delay_us: u32,
    pins: StepPins,
    lifecycle: Lifecycle,
}

impl<F, T, D> FifoEngine<F, T, D>
where
    F: SampleFifo,
    T: StepTimer,
    D: DelayNs,
{
    /// Create an engine over a sample FIFO, step timer and delay.
    pub fn new(fifo: F, timer: T, delay: D) -> Self {
        Self {
            fifo,
            timer,
            delay,
            port_data: 0,
            new_port_data: 0,
            pulse_counts: 1,
            frame_us: 1,
            dir_delay_us: 0,
            pins: StepPins::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Access the FIFO.
    pub fn fifo(&self) -> &F {
        &self.fifo
    }

    /// Idle output word.
    pub fn port_data(&self) -> u32 {
        self.port_data
    }

    /// Frames per step pulse.
    pub fn pulse_counts(&self) -> u32 {
        self.pulse_counts
    }
}

impl<F, T, D> StepEngine for FifoEngine<F, T, D>
where
    F: SampleFifo,
    T: StepTimer,
    D: DelayNs,
{
    fn name(&self) -> &str {
        "i2s"
    }

    fn init(&mut self, timing: EngineTiming) -> Result<u32> {
        self.frame_us = self.fifo.frame_us().max(1);
        let (counts, actual) = pulse_frames(timing.pulse_us, self.frame_us);
        self.pulse_counts = counts;
        self.dir_delay_us = timing.dir_delay_us;
        self.timer.stop();
        self.lifecycle.initialized();
        Ok(actual)
    }

    fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle> {
        self.lifecycle.require_init()?;
        check_pin(pin)?;
        let handle = StepPinHandle::new(pin, inverted);
        self.pins.add(handle)?;
        set_word_bit(&mut self.port_data, pin, handle.level(false));
        self.fifo.push(self.port_data);
        Ok(handle)
    }

    #[inline]
    fn set_dir_pin(&mut self, pin: u8, level: bool) {
        set_word_bit(&mut self.port_data, pin, level);
    }

    #[inline]
    fn finish_dir(&mut self) {
        self.fifo.push(self.port_data);
        if self.dir_delay_us > 0 {
            self.delay.delay_us(self.dir_delay_us);
        }
    }

    #[inline]
    fn start_step(&mut self) {
        self.new_port_data = self.port_data;
    }

    #[inline]
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
        set_word_bit(&mut self.new_port_data, pin.id(), pin.level(active));
    }

    fn finish_step(&mut self) {
        if self.new_port_data == self.port_data {
            return;
        }
        for _ in 0..self.pulse_counts {
            self.fifo.push(self.new_port_data);
        }
        // One idle frame ends the pulse; the timer spaces the next one.
        self.fifo.push(self.port_data);
    }

    #[inline]
    fn start_unstep(&mut self) -> UnstepAction {
        UnstepAction::Skip
    }

    #[inline]
    fn finish_unstep(&mut self) {}

    fn max_pulses_per_sec(&self) -> u32 {
        1_000_000 / (2 * self.pulse_counts * self.frame_us)
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
            set_word_bit(&mut self.port_data, handle.id(), handle.level(false));
        }
        self.fifo.push(self.port_data);
        self.lifecycle.park();
    }
}

/// Shift-register engine whose FIFO refill interrupt drives the executor.
///
/// [`StepEngine::service_refill`] is the refill interrupt entry point. It is
/// not reentrant: it runs only from the FIFO interrupt, and the executor it
/// calls must not be entered from anywhere else while this engine streams.
///
/// In low-latency mode the engine behaves like [`FifoEngine`]: the step
/// timer runs the executor and each pulse is pushed as soon as it is
/// stepped. Homing and probing use this mode so a switch trip stops motion
/// without a FIFO's worth of queued frames.
pub struct FifoStreamEngine<F, T, D> {
    fifo: F,
    timer: T,
    delay: D,
    port_data: u32,
    pulse_data: u32,
    pulse_counts: u32,
    frame_us: u32,
    dir_delay_us: u32,
    dir_counts: u32,
    tick_divisor: u32,
    delay_counts: u32,
    remaining_dir_counts: u32,
    remaining_pulse_counts: u32,
    remaining_delay_counts: u32,
    streaming: bool,
    low_latency: bool,
    pins: StepPins,
    lifecycle: Lifecycle,
}

impl<F, T, D> FifoStreamEngine<F, T, D>
where
    F: SampleFifo,
    T: StepTimer,
    D: DelayNs,
{
    /// Create an engine over a sample FIFO, the step timer used in
    /// low-latency mode, and a delay.
    pub fn new(fifo: F, timer: T, delay: D) -> Self {
        Self {
            fifo,
            timer,
            delay,
            port_data: 0,
            pulse_data: 0,
            pulse_counts: 1,
            frame_us: 1,
            dir_delay_us: 0,
            dir_counts: 0,
            tick_divisor: 1,
            delay_counts: 40,
            remaining_dir_counts: 0,
            remaining_pulse_counts: 0,
            remaining_delay_counts: 0,
            streaming: false,
            low_latency: false,
            pins: StepPins::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Access the FIFO.
    pub fn fifo(&self) -> &F {
        &self.fifo
    }

    /// Access the step timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Idle output word.
    pub fn port_data(&self) -> u32 {
        self.port_data
    }

    /// Idle frames between pulse events.
    pub fn delay_counts(&self) -> u32 {
        self.delay_counts
    }

    /// Frames spanning the direction delay.
    pub fn dir_counts(&self) -> u32 {
        self.dir_counts
    }

    /// Pulses go out from the step timer instead of the refill interrupt.
    pub fn is_low_latency(&self) -> bool {
        self.low_latency
    }

    fn write_port(&mut self, pin: u8, level: bool) {
        set_word_bit(&mut self.port_data, pin, level);
        if !self.lifecycle.is_running() {
            self.fifo.push(self.port_data);
        }
    }

    fn clear_pending(&mut self) {
        self.remaining_dir_counts = 0;
        self.remaining_pulse_counts = 0;
        self.remaining_delay_counts = 0;
    }
}

impl<F, T, D> StepEngine for FifoStreamEngine<F, T, D>
where
    F: SampleFifo,
    T: StepTimer,
    D: DelayNs,
{
    fn name(&self) -> &str {
        "i2s_stream"
    }

    fn init(&mut self, timing: EngineTiming) -> Result<u32> {
        self.frame_us = self.fifo.frame_us().max(1);
        let (counts, actual) = pulse_frames(timing.pulse_us, self.frame_us);
        self.pulse_counts = counts;
        self.dir_delay_us = timing.dir_delay_us;
        self.dir_counts = (timing.dir_delay_us + self.frame_us - 1) / self.frame_us;
        let divisor = u64::from(timing.frequency_hz) * u64::from(self.frame_us) / 1_000_000;
        self.tick_divisor = u32::try_from(divisor).unwrap_or(u32::MAX).max(1);
        self.clear_pending();
        self.timer.stop();
        self.lifecycle.initialized();
        Ok(actual)
    }

    fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle> {
        self.lifecycle.require_init()?;
        check_pin(pin)?;
        let handle = StepPinHandle::new(pin, inverted);
        self.pins.add(handle)?;
        self.write_port(pin, handle.level(false));
        Ok(handle)
    }

    #[inline]
    fn set_dir_pin(&mut self, pin: u8, level: bool) {
        self.write_port(pin, level);
    }

    #[inline]
    fn finish_dir(&mut self) {
        if self.low_latency {
            self.fifo.push(self.port_data);
            if self.dir_delay_us > 0 {
                self.delay.delay_us(self.dir_delay_us);
            }
        } else {
            // Streamed ahead of the next pulse frames by the refill loop
            self.remaining_dir_counts = self.dir_counts;
        }
    }

    #[inline]
    fn start_step(&mut self) {
        self.pulse_data = self.port_data;
    }

    #[inline]
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
        set_word_bit(&mut self.pulse_data, pin.id(), pin.level(active));
    }

    fn finish_step(&mut self) {
        // While streaming, pulse frames are emitted by the refill loop
        if !self.low_latency || self.pulse_data == self.port_data {
            return;
        }
        for _ in 0..self.pulse_counts {
            self.fifo.push(self.pulse_data);
        }
        self.fifo.push(self.port_data);
    }

    #[inline]
    fn start_unstep(&mut self) -> UnstepAction {
        UnstepAction::Skip
    }

    #[inline]
    fn finish_unstep(&mut self) {}

    fn max_pulses_per_sec(&self) -> u32 {
        1_000_000 / (2 * self.pulse_counts * self.frame_us)
    }

    #[inline]
    fn set_timer_ticks(&mut self, ticks: u32) {
        if self.low_latency {
            self.timer.set_period_ticks(ticks);
        } else if ticks > 0 {
            self.delay_counts = (ticks / self.tick_divisor).max(1);
        }
    }

    fn start_timer(&mut self) {
        if self.low_latency {
            self.timer.start();
        } else if !self.streaming {
            self.fifo.set_refill_interrupt(true);
            self.fifo.clear_refill_interrupt();
            self.streaming = true;
        }
        self.lifecycle.start();
    }

    fn stop_timer(&mut self) {
        self.timer.stop();
        if self.streaming {
            self.fifo.set_refill_interrupt(false);
            self.streaming = false;
        }
        self.lifecycle.stop();
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn park(&mut self) {
        self.stop_timer();
        for handle in self.pins.iter() {
            set_word_bit(&mut self.port_data, handle.id(), handle.level(false));
        }
        self.fifo.push(self.port_data);
        self.clear_pending();
        self.lifecycle.park();
    }

    fn set_low_latency(&mut self, enabled: bool) -> bool {
        if self.lifecycle.is_running() {
            self.stop_timer();
        }
        self.clear_pending();
        let changed = self.low_latency != enabled;
        self.low_latency = enabled;
        changed
    }

    fn service_refill(&mut self, pulse: &mut dyn FnMut(&mut dyn StepEngine)) {
        let mut budget = FIFO_RELOAD;
        while budget > 0 && self.streaming {
            if self.remaining_dir_counts > 0 {
                self.fifo.push(self.port_data);
                self.remaining_dir_counts -= 1;
                budget -= 1;
            } else if self.remaining_pulse_counts > 0 {
                self.fifo.push(self.pulse_data);
                self.remaining_pulse_counts -= 1;
                budget -= 1;
            } else if self.remaining_delay_counts > 0 {
                self.fifo.push(self.port_data);
                self.remaining_delay_counts -= 1;
                budget -= 1;
            } else {
                self.pulse_data = self.port_data;
                pulse(&mut *self);
                self.remaining_pulse_counts = if self.pulse_data == self.port_data {
                    0
                } else {
                    self.pulse_counts
                };
                self.remaining_delay_counts = self
                    .delay_counts
                    .saturating_sub(self.remaining_dir_counts + self.remaining_pulse_counts);
            }
        }
        // Acknowledge only after refilling, or the interrupt refires at once.
        self.fifo.clear_refill_interrupt();
    }
}
