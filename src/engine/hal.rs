//! Minimal hardware-access ports the step engines are written against.
//!
//! Each engine owns the ports it needs, so ramp and Bresenham logic stay
//! hardware independent and the engines run on a host against simulated
//! ports. Delays use `embedded_hal::delay::DelayNs`.

use embedded_hal::digital::OutputPin;

/// Bank of GPIO outputs addressed by pin number.
pub trait PinPort {
    /// Drive `pin` to `level`.
    fn write(&mut self, pin: u8, level: bool);

    /// Number of addressable pins.
    fn pin_count(&self) -> u8;
}

/// Periodic step timer.
pub trait StepTimer {
    /// Ticks until the next interrupt.
    fn set_period_ticks(&mut self, ticks: u32);

    /// Enable the timer interrupt.
    fn start(&mut self);

    /// Disable the timer interrupt.
    fn stop(&mut self);
}

/// Free-running counter used for spin-wait deadlines.
pub trait CycleClock {
    /// Current counter value; wraps.
    fn now(&self) -> u32;

    /// Counter ticks per microsecond.
    fn ticks_per_us(&self) -> u32;
}

/// Wrapping deadline `us` microseconds from now.
#[inline]
pub fn deadline_after<C: CycleClock + ?Sized>(clock: &C, us: u32) -> u32 {
    clock.now().wrapping_add(us.wrapping_mul(clock.ticks_per_us()))
}

/// Busy-wait until a deadline from [`deadline_after`] has passed.
#[inline]
pub fn spin_until<C: CycleClock + ?Sized>(clock: &C, deadline: u32) {
    // Signed difference handles counter wrap.
    while (deadline.wrapping_sub(clock.now()) as i32) > 0 {
        core::hint::spin_loop();
    }
}

/// Set or clear bit `pin` of a shift-register output word.
#[inline]
pub fn set_word_bit(word: &mut u32, pin: u8, level: bool) {
    let bit = 1u32 << (pin & 31);
    if level {
        *word |= bit;
    } else {
        *word &= !bit;
    }
}

/// One entry of a pulse-replay waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseItem {
    /// First half duration, channel clock ticks
    pub duration0: u16,
    /// First half level
    pub level0: bool,
    /// Second half duration, channel clock ticks
    pub duration1: u16,
    /// Second half level
    pub level1: bool,
}

/// Hardware channels that replay a stored waveform on trigger.
pub trait ReplayChannels {
    /// Number of channels available.
    fn channel_count(&self) -> u8;

    /// Route `pin` to `channel` and store its waveform and idle level.
    fn configure(&mut self, channel: u8, pin: u8, waveform: [PulseItem; 2], idle_level: bool);

    /// Reset the channel read pointer and start playback.
    fn retrigger(&mut self, channel: u8);

    /// Stop playback and hold the idle level.
    fn halt(&mut self, channel: u8);
}

/// Serial-out peripheral with a sample FIFO feeding an external shift register.
///
/// Each 32-bit sample is one frame: every bit drives one shift-register output
/// for `frame_us` microseconds.
pub trait SampleFifo {
    /// Append one sample.
    fn push(&mut self, sample: u32);

    /// Frame duration, microseconds.
    fn frame_us(&self) -> u32;

    /// Enable or disable the low-watermark refill interrupt.
    fn set_refill_interrupt(&mut self, enabled: bool);

    /// Acknowledge the refill interrupt.
    fn clear_refill_interrupt(&mut self);
}

/// Three dedicated outputs clocking a shift register by hand.
pub trait ShiftPort {
    /// Word-select (latch) line.
    fn set_ws(&mut self, level: bool);

    /// Serial data line.
    fn set_data(&mut self, level: bool);

    /// Bit clock line.
    fn set_bck(&mut self, level: bool);
}

/// [`PinPort`] over an array of `embedded_hal` output pins.
///
/// Pin write errors are dropped: the port is driven from interrupt context,
/// where there is nobody to report them to.
pub struct OutputPins<P: OutputPin, const K: usize> {
    pins: [P; K],
}

impl<P: OutputPin, const K: usize> OutputPins<P, K> {
    /// Wrap pins; pin number `n` addresses `pins[n]`.
    pub fn new(pins: [P; K]) -> Self {
        Self { pins }
    }

    /// Release the pins.
    pub fn into_inner(self) -> [P; K] {
        self.pins
    }
}

impl<P: OutputPin, const K: usize> PinPort for OutputPins<P, K> {
    fn write(&mut self, pin: u8, level: bool) {
        if let Some(p) = self.pins.get_mut(usize::from(pin)) {
            let _ = if level { p.set_high() } else { p.set_low() };
        }
    }

    fn pin_count(&self) -> u8 {
        K.min(u8::MAX as usize) as u8
    }
}
