//! Simulated hardware and collaborators shared by the integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal_mock::eh1::delay::NoopDelay;
use stepper_segments::config::AxisConfig;
use stepper_segments::engine::fifo::{FifoEngine, FifoStreamEngine};
use stepper_segments::engine::hal::{
    CycleClock, PinPort, PulseItem, ReplayChannels, SampleFifo, ShiftPort, StepTimer,
};
use stepper_segments::engine::replay::ReplayEngine;
use stepper_segments::engine::shiftout::ShiftOutEngine;
use stepper_segments::engine::timed::TimedEngine;
use stepper_segments::{
    MotorDrivers, Planner, PlannerBlock, Probe, Spindle, StepControl, StepEngine, StepperCore,
    SystemConfig,
};

// =============================================================================
// Pin layout
// =============================================================================

/// Step pins for X, Y, Z.
pub const STEP_PINS: [u8; 3] = [0, 1, 2];

/// Direction pins for X, Y, Z.
pub const DIR_PINS: [u8; 3] = [8, 9, 10];

/// 100 mm/s^2 in mm/min^2.
pub const ACCEL: f32 = 360_000.0;

pub fn config(n_axis: usize) -> SystemConfig {
    let mut config = SystemConfig::default();
    for axis in 0..n_axis {
        config
            .axes
            .push(AxisConfig::new(STEP_PINS[axis], DIR_PINS[axis]))
            .unwrap();
    }
    config
}

// =============================================================================
// Simulated ports
// =============================================================================

/// Counter that advances one tick per read, so spin-waits terminate.
#[derive(Default)]
pub struct SimClock {
    now: Cell<u32>,
}

impl CycleClock for SimClock {
    fn now(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }

    fn ticks_per_us(&self) -> u32 {
        1
    }
}

#[derive(Debug, Default)]
pub struct SimTimer {
    pub period: u32,
    pub running: bool,
    pub starts: u32,
}

impl StepTimer for SimTimer {
    fn set_period_ticks(&mut self, ticks: u32) {
        self.period = ticks;
    }

    fn start(&mut self) {
        self.running = true;
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

/// Electrical level history of a 32-pin GPIO bank.
#[derive(Debug, Default)]
pub struct SimPort {
    pub levels: [bool; 32],
    pub rising: [u32; 32],
}

impl SimPort {
    fn drive(&mut self, pin: u8, level: bool) {
        let pin = usize::from(pin);
        if level && !self.levels[pin] {
            self.rising[pin] += 1;
        }
        self.levels[pin] = level;
    }
}

impl PinPort for SimPort {
    fn write(&mut self, pin: u8, level: bool) {
        self.drive(pin, level);
    }

    fn pin_count(&self) -> u8 {
        32
    }
}

/// Replay channels that count retriggers per routed pin.
#[derive(Debug, Default)]
pub struct SimChannels {
    pub routes: [u8; 8],
    pub pulses: [u32; 32],
    pub halted: u32,
}

impl ReplayChannels for SimChannels {
    fn channel_count(&self) -> u8 {
        8
    }

    fn configure(&mut self, channel: u8, pin: u8, _waveform: [PulseItem; 2], _idle_level: bool) {
        self.routes[usize::from(channel)] = pin;
    }

    fn retrigger(&mut self, channel: u8) {
        let pin = self.routes[usize::from(channel)];
        self.pulses[usize::from(pin)] += 1;
    }

    fn halt(&mut self, _channel: u8) {
        self.halted += 1;
    }
}

/// Sample FIFO recording every pushed word.
#[derive(Debug)]
pub struct SimFifo {
    pub samples: Vec<u32>,
    pub frame_us: u32,
    pub refill_enabled: bool,
    pub acks: u32,
}

impl Default for SimFifo {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            frame_us: 4,
            refill_enabled: false,
            acks: 0,
        }
    }
}

impl SampleFifo for SimFifo {
    fn push(&mut self, sample: u32) {
        self.samples.push(sample);
    }

    fn frame_us(&self) -> u32 {
        self.frame_us
    }

    fn set_refill_interrupt(&mut self, enabled: bool) {
        self.refill_enabled = enabled;
    }

    fn clear_refill_interrupt(&mut self) {
        self.acks += 1;
    }
}

/// Shift register fed by bit-banged clock, data and latch lines.
#[derive(Debug, Default)]
pub struct SimShiftRegister {
    shift: u32,
    data: bool,
    bck: bool,
    ws: bool,
    pub latched: Vec<u32>,
}

impl ShiftPort for SimShiftRegister {
    fn set_ws(&mut self, level: bool) {
        if level && !self.ws {
            self.latched.push(self.shift);
        }
        self.ws = level;
    }

    fn set_data(&mut self, level: bool) {
        self.data = level;
    }

    fn set_bck(&mut self, level: bool) {
        if level && !self.bck {
            self.shift = (self.shift << 1) | u32::from(self.data);
        }
        self.bck = level;
    }
}

/// Rising edges of `bit` across a stream of output words.
pub fn word_edges(words: &[u32], bit: u8) -> u32 {
    let mut last = false;
    let mut edges = 0;
    for word in words {
        let level = word & (1 << bit) != 0;
        if level && !last {
            edges += 1;
        }
        last = level;
    }
    edges
}

/// Level of `bit` in the last word of a stream.
pub fn word_level(words: &[u32], bit: u8) -> bool {
    words.last().map_or(false, |w| w & (1 << bit) != 0)
}

// =============================================================================
// Engines over simulated ports
// =============================================================================

pub type SimTimed = TimedEngine<SimPort, SimTimer, SimClock, NoopDelay>;
pub type SimReplay = ReplayEngine<SimChannels, SimPort, SimTimer>;
pub type SimFifoEngine = FifoEngine<SimFifo, SimTimer, NoopDelay>;
pub type SimStream = FifoStreamEngine<SimFifo, SimTimer, NoopDelay>;
pub type SimShiftOut = ShiftOutEngine<SimShiftRegister, SimTimer, SimClock, NoopDelay>;

pub fn timed() -> SimTimed {
    TimedEngine::new(
        SimPort::default(),
        SimTimer::default(),
        SimClock::default(),
        NoopDelay::new(),
    )
}

pub fn replay() -> SimReplay {
    ReplayEngine::new(SimChannels::default(), SimPort::default(), SimTimer::default())
}

pub fn fifo() -> SimFifoEngine {
    FifoEngine::new(SimFifo::default(), SimTimer::default(), NoopDelay::new())
}

pub fn stream() -> SimStream {
    FifoStreamEngine::new(SimFifo::default(), SimTimer::default(), NoopDelay::new())
}

pub fn shiftout() -> SimShiftOut {
    ShiftOutEngine::new(
        SimShiftRegister::default(),
        SimTimer::default(),
        SimClock::default(),
        NoopDelay::new(),
    )
}

// =============================================================================
// Collaborators
// =============================================================================

/// Planner queue with a separate system-motion block.
#[derive(Debug, Default)]
pub struct TestPlanner {
    pub queue: VecDeque<PlannerBlock>,
    pub system: Option<PlannerBlock>,
    pub discarded: usize,
}

impl TestPlanner {
    pub fn with_blocks(blocks: &[PlannerBlock]) -> Self {
        Self {
            queue: blocks.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn total_steps(&self) -> u32 {
        self.queue.iter().map(|b| b.step_event_count).sum()
    }
}

impl Planner for TestPlanner {
    fn current_block(&mut self) -> Option<&mut PlannerBlock> {
        self.queue.front_mut()
    }

    fn system_motion_block(&mut self) -> Option<&mut PlannerBlock> {
        self.system.as_mut()
    }

    fn discard_current_block(&mut self) {
        if self.queue.pop_front().is_some() {
            self.discarded += 1;
        }
    }

    fn exec_block_exit_speed_sqr(&self) -> f32 {
        self.queue.get(1).map_or(0.0, |b| b.entry_speed_sqr)
    }

    fn compute_profile_nominal_speed(&self, block: &PlannerBlock) -> f32 {
        block.nominal_speed
    }
}

#[derive(Debug, Default)]
pub struct TestSpindle {
    pub rate_adjusted: bool,
    pub output: AtomicU32,
    pub writes: AtomicU32,
}

impl Spindle for TestSpindle {
    fn map_speed(&self, speed: f32) -> u32 {
        speed as u32
    }

    fn set_speed_from_isr(&self, dev_speed: u32) {
        self.output.store(dev_speed, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn is_rate_adjusted(&self) -> bool {
        self.rate_adjusted
    }
}

#[derive(Debug, Default)]
pub struct TestProbe {
    pub tripped: AtomicBool,
}

impl Probe for TestProbe {
    fn tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct TestDrivers {
    pub disabled: Option<bool>,
}

impl MotorDrivers for TestDrivers {
    fn set_disable(&mut self, disable: bool) {
        self.disabled = Some(disable);
    }
}

// =============================================================================
// Drivers
// =============================================================================

/// Environment one stepper core runs against.
#[derive(Default)]
pub struct Bench {
    pub planner: TestPlanner,
    pub spindle: TestSpindle,
    pub probe: TestProbe,
    pub control: StepControl,
    pub drivers: TestDrivers,
}

impl Bench {
    pub fn new(blocks: &[PlannerBlock]) -> Self {
        Self {
            planner: TestPlanner::with_blocks(blocks),
            ..Default::default()
        }
    }
}

const TICK_LIMIT: usize = 2_000_000;

/// Tick the stepper from the step timer until the cycle stops. Returns ticks.
pub fn run_timed<E: StepEngine, const N: usize>(
    stepper: &mut StepperCore<E, N>,
    bench: &mut Bench,
) -> usize {
    stepper.prep_buffer(&mut bench.planner, &bench.spindle, &mut bench.control);
    stepper.wake_up(&mut bench.drivers, &mut NoopDelay::new());
    for tick in 0..TICK_LIMIT {
        if stepper.signals().take_cycle_stop() {
            return tick;
        }
        stepper.pulse_func(&bench.spindle, &bench.probe);
        stepper.prep_buffer(&mut bench.planner, &bench.spindle, &mut bench.control);
    }
    panic!("cycle never stopped");
}

/// Drive the stepper from FIFO refill interrupts until the cycle stops.
pub fn run_refill<E: StepEngine, const N: usize>(
    stepper: &mut StepperCore<E, N>,
    bench: &mut Bench,
) -> usize {
    stepper.prep_buffer(&mut bench.planner, &bench.spindle, &mut bench.control);
    stepper.wake_up(&mut bench.drivers, &mut NoopDelay::new());
    for refill in 0..TICK_LIMIT {
        if stepper.signals().take_cycle_stop() {
            return refill;
        }
        stepper.service_refill(&bench.spindle, &bench.probe);
        stepper.prep_buffer(&mut bench.planner, &bench.spindle, &mut bench.control);
    }
    panic!("cycle never stopped");
}
