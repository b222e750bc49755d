//! Hardware pulse-replay engine.
//!
//! Each step output gets its own replay channel holding a two-item waveform:
//! the direction delay at idle level, the pulse at active level, then a
//! terminator. A step is just a read-pointer reset and retrigger, so the
//! hardware ends every pulse on its own. The pulse shape is fixed at
//! configuration time.

use embedded_hal::digital::OutputPin;

use super::hal::{PinPort, PulseItem, ReplayChannels, StepTimer};
use super::{EngineState, EngineTiming, Lifecycle, StepEngine, StepPinHandle, StepPins, UnstepAction};
use crate::error::{EngineError, Error, Result};

/// Channel clock ticks per microsecond (80 MHz APB / 20).
pub const REPLAY_TICKS_PER_US: u32 = 4;

/// Step engine retriggering pre-programmed pulse channels.
pub struct ReplayEngine<R, P, T> {
    channels: R,
    dir_port: P,
    timer: T,
    pulse_us: u32,
    dir_delay_us: u32,
    next_channel: u8,
    pins: StepPins,
    lifecycle: Lifecycle,
}

impl<R, P, T> ReplayEngine<R, P, T>
where
    R: ReplayChannels,
    P: PinPort,
    T: StepTimer,
{
    /// Create an engine over replay channels, a GPIO port for direction pins
    /// and a step timer.
    pub fn new(channels: R, dir_port: P, timer: T) -> Self {
        Self {
            channels,
            dir_port,
            timer,
            pulse_us: 0,
            dir_delay_us: 0,
            next_channel: 0,
            pins: StepPins::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Access the replay channels.
    pub fn channels(&self) -> &R {
        &self.channels
    }

    /// Access the direction port.
    pub fn dir_port(&self) -> &P {
        &self.dir_port
    }

    /// Waveform stored for every channel.
    pub fn waveform(&self, inverted: bool) -> [PulseItem; 2] {
        let idle = inverted;
        let lead = if self.dir_delay_us > 0 {
            self.dir_delay_us * REPLAY_TICKS_PER_US
        } else {
            1
        };
        [
            PulseItem {
                duration0: ticks(lead),
                level0: idle,
                duration1: ticks(self.pulse_us * REPLAY_TICKS_PER_US),
                level1: !idle,
            },
            PulseItem::default(),
        ]
    }
}

fn ticks(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

impl<R, P, T> StepEngine for ReplayEngine<R, P, T>
where
    R: ReplayChannels,
    P: PinPort,
    T: StepTimer,
{
    fn name(&self) -> &str {
        "rmt"
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
        if self.next_channel >= self.channels.channel_count() {
            return Err(Error::Engine(EngineError::NoFreeChannel));
        }
        let channel = self.next_channel;
        let handle = StepPinHandle::new(channel, inverted);
        self.pins.add(handle)?;
        self.next_channel += 1;

        let waveform = self.waveform(inverted);
        self.channels.configure(channel, pin, waveform, inverted);
        Ok(handle)
    }

    #[inline]
    fn set_dir_pin(&mut self, pin: u8, level: bool) {
        self.dir_port.write(pin, level);
    }

    // The direction delay is the waveform's leading idle item
    #[inline]
    fn finish_dir(&mut self) {}

    #[inline]
    fn start_step(&mut self) {}

    #[inline]
    fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
        if active {
            self.channels.retrigger(pin.id());
        }
    }

    #[inline]
    fn finish_step(&mut self) {}

    #[inline]
    fn start_unstep(&mut self) -> UnstepAction {
        UnstepAction::Skip
    }

    #[inline]
    fn finish_unstep(&mut self) {}

    fn max_pulses_per_sec(&self) -> u32 {
        1_000_000 / (2 * self.pulse_us.max(1) + self.dir_delay_us)
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
            self.channels.halt(handle.id());
        }
        self.lifecycle.park();
    }
}

/// [`ReplayChannels`] stand-in that emits each retriggered pulse on an
/// `embedded_hal` pin, for boards without replay hardware.
///
/// Playback is immediate: the pin goes active and back to idle within
/// `retrigger`.
pub struct PinReplay<O: OutputPin, const K: usize> {
    pins: [O; K],
    idle: [bool; K],
}

impl<O: OutputPin, const K: usize> PinReplay<O, K> {
    /// One channel per pin.
    pub fn new(pins: [O; K]) -> Self {
        Self {
            pins,
            idle: [false; K],
        }
    }

    /// Release the pins.
    pub fn into_inner(self) -> [O; K] {
        self.pins
    }
}

impl<O: OutputPin, const K: usize> ReplayChannels for PinReplay<O, K> {
    fn channel_count(&self) -> u8 {
        K.min(u8::MAX as usize) as u8
    }

    fn configure(&mut self, channel: u8, _pin: u8, _waveform: [PulseItem; 2], idle_level: bool) {
        let ch = usize::from(channel);
        if let (Some(pin), Some(idle)) = (self.pins.get_mut(ch), self.idle.get_mut(ch)) {
            *idle = idle_level;
            let _ = pin.set_state(idle_level.into());
        }
    }

    fn retrigger(&mut self, channel: u8) {
        let ch = usize::from(channel);
        if let (Some(pin), Some(&idle)) = (self.pins.get_mut(ch), self.idle.get(ch)) {
            let _ = pin.set_state((!idle).into());
            let _ = pin.set_state(idle.into());
        }
    }

    fn halt(&mut self, channel: u8) {
        let ch = usize::from(channel);
        if let (Some(pin), Some(&idle)) = (self.pins.get_mut(ch), self.idle.get(ch)) {
            let _ = pin.set_state(idle.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[derive(Default)]
    struct Channels {
        configured: heapless::Vec<(u8, u8, [PulseItem; 2], bool), 4>,
        triggers: heapless::Vec<u8, 16>,
    }

    impl ReplayChannels for Channels {
        fn channel_count(&self) -> u8 {
            2
        }

        fn configure(&mut self, channel: u8, pin: u8, waveform: [PulseItem; 2], idle_level: bool) {
            let _ = self.configured.push((channel, pin, waveform, idle_level));
        }

        fn retrigger(&mut self, channel: u8) {
            let _ = self.triggers.push(channel);
        }

        fn halt(&mut self, _channel: u8) {}
    }

    struct NoPins;

    impl PinPort for NoPins {
        fn write(&mut self, _pin: u8, _level: bool) {}

        fn pin_count(&self) -> u8 {
            32
        }
    }

    struct NoTimer;

    impl StepTimer for NoTimer {
        fn set_period_ticks(&mut self, _ticks: u32) {}
        fn start(&mut self) {}
        fn stop(&mut self) {}
    }

    fn engine(dir_delay_us: u32) -> ReplayEngine<Channels, NoPins, NoTimer> {
        let mut e = ReplayEngine::new(Channels::default(), NoPins, NoTimer);
        e.init(EngineTiming {
            dir_delay_us,
            pulse_us: 3,
            frequency_hz: 20_000_000,
        })
        .unwrap();
        e
    }

    #[test]
    fn test_waveform_bakes_in_direction_delay() {
        let mut e = engine(2);
        e.init_step_pin(17, false).unwrap();
        let (channel, pin, waveform, idle) = e.channels().configured[0];
        assert_eq!((channel, pin, idle), (0, 17, false));
        assert_eq!(waveform[0].duration0, 8);
        assert_eq!(waveform[0].duration1, 12);
        assert!(!waveform[0].level0);
        assert!(waveform[0].level1);
        assert_eq!(waveform[1], PulseItem::default());
    }

    #[test]
    fn test_zero_direction_delay_uses_one_tick() {
        let e = engine(0);
        assert_eq!(e.waveform(true)[0].duration0, 1);
        assert!(e.waveform(true)[0].level0);
    }

    #[test]
    fn test_channels_run_out() {
        let mut e = engine(0);
        assert_eq!(e.init_step_pin(1, false).unwrap().id(), 0);
        assert_eq!(e.init_step_pin(2, false).unwrap().id(), 1);
        assert_eq!(
            e.init_step_pin(3, false),
            Err(Error::Engine(EngineError::NoFreeChannel))
        );
    }

    #[test]
    fn test_step_retriggers_and_skips_unstep() {
        let mut e = engine(0);
        let x = e.init_step_pin(1, false).unwrap();
        e.start_step();
        e.set_step_pin(x, true);
        e.finish_step();
        e.set_step_pin(x, false);
        assert_eq!(e.start_unstep(), UnstepAction::Skip);
        assert_eq!(e.channels().triggers.as_slice(), &[0]);
    }

    #[test]
    fn test_max_rate_includes_direction_delay() {
        assert_eq!(engine(4).max_pulses_per_sec(), 100_000);
    }

    #[test]
    fn test_pin_replay_pulses_pin() {
        let pin = PinMock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
            Transaction::set(State::Low),
        ]);
        let mut replay = PinReplay::new([pin]);
        replay.configure(0, 5, [PulseItem::default(); 2], false);
        replay.retrigger(0);
        for mut pin in replay.into_inner() {
            pin.done();
        }
    }
}
