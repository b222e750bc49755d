//! Pulse execution: the interrupt-context Bresenham tracer.
//!
//! Each call to [`PulseExecutor::pulse`] is one timer tick. The step bits
//! computed on the previous tick are emitted first, so the edge lands at a
//! fixed offset from the interrupt; then the next tick's bits are computed.

use super::block::{AxisMask, StepperBlockData, MAX_AXES};
use crate::buffer::SegmentConsumer;
use crate::engine::{StepEngine, StepPinHandle, UnstepAction};
use crate::error::{EngineError, Error, Result};
use crate::machine::{Probe, Signals, Spindle};

/// Pins of one axis as registered with the step engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisPins {
    /// Step output handle from [`StepEngine::init_step_pin`]
    pub step: StepPinHandle,
    /// Direction pin number
    pub dir_pin: u8,
    /// Direction pin is active low
    pub dir_invert: bool,
}

/// Interrupt half of the stepper core.
#[derive(Debug, Clone)]
pub struct PulseExecutor {
    axes: heapless::Vec<AxisPins, MAX_AXES>,

    counter: [u32; MAX_AXES],
    steps: [u32; MAX_AXES],
    step_count: u32,
    segment_loaded: bool,
    exec_block_index: u8,
    exec_block: Option<StepperBlockData>,

    step_outbits: AxisMask,
    dir_outbits: AxisMask,
    previous_dir: AxisMask,

    motor_steps: [i32; MAX_AXES],
    probe_steps: [i32; MAX_AXES],
}

impl Default for PulseExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseExecutor {
    /// Create an executor with no axes attached.
    pub fn new() -> Self {
        Self {
            axes: heapless::Vec::new(),
            counter: [0; MAX_AXES],
            steps: [0; MAX_AXES],
            step_count: 0,
            segment_loaded: false,
            exec_block_index: 0,
            exec_block: None,
            step_outbits: 0,
            dir_outbits: 0,
            // Forces direction pins out on the first tick
            previous_dir: AxisMask::MAX,
            motor_steps: [0; MAX_AXES],
            probe_steps: [0; MAX_AXES],
        }
    }

    /// Attach the next axis.
    ///
    /// # Errors
    ///
    /// Returns an error if all axes are attached.
    pub fn attach_axis(&mut self, pins: AxisPins) -> Result<()> {
        self.axes
            .push(pins)
            .map_err(|_| Error::Engine(EngineError::NoFreeChannel))
    }

    /// Attached axes.
    pub fn axes(&self) -> &[AxisPins] {
        &self.axes
    }

    /// One step timer tick.
    #[inline]
    pub fn pulse<E, S, P, const N: usize>(
        &mut self,
        engine: &mut E,
        segments: &mut SegmentConsumer<'_, N>,
        spindle: &S,
        probe: &P,
        signals: &Signals,
    ) where
        E: StepEngine + ?Sized,
        S: Spindle + ?Sized,
        P: Probe + ?Sized,
    {
        self.emit_step(engine);

        if !self.segment_loaded {
            let Some(segment) = segments.peek() else {
                self.stop_stepping(engine);
                if self.exec_block.map_or(false, |b| b.is_pwm_rate_adjusted) {
                    spindle.set_speed_from_isr(0);
                }
                signals.raise_cycle_stop();
                return;
            };

            engine.set_timer_ticks(u32::from(segment.isr_period));
            self.step_count = segment.n_step;

            let block = match self.exec_block {
                Some(block) if self.exec_block_index == segment.block_index => block,
                _ => {
                    let block = segments.block(segment.block_index);
                    self.exec_block_index = segment.block_index;
                    self.exec_block = Some(block);
                    let half = block.step_event_count >> 1;
                    for counter in self.counter.iter_mut().take(self.axes.len()) {
                        *counter = half;
                    }
                    block
                }
            };

            self.dir_outbits = block.direction_bits;
            for (steps, &block_steps) in self
                .steps
                .iter_mut()
                .zip(block.steps.iter())
                .take(self.axes.len())
            {
                *steps = block_steps >> segment.amass_level;
            }
            spindle.set_speed_from_isr(segment.spindle_dev_speed);
            self.segment_loaded = true;
        }

        if signals.probe_armed() && probe.tripped() {
            signals.disarm_probe();
            self.probe_steps = self.motor_steps;
            signals.raise_motion_cancel();
        }

        self.step_outbits = 0;
        if let Some(block) = self.exec_block {
            for axis in 0..self.axes.len() {
                self.counter[axis] += self.steps[axis];
                if self.counter[axis] > block.step_event_count {
                    self.step_outbits |= 1 << axis;
                    self.counter[axis] -= block.step_event_count;
                    if block.direction_bits & (1 << axis) != 0 {
                        self.motor_steps[axis] -= 1;
                    } else {
                        self.motor_steps[axis] += 1;
                    }
                }
            }
        }

        // A zero-step segment still occupies one tick
        self.step_count = self.step_count.saturating_sub(1);
        if self.step_count == 0 {
            segments.release();
            self.segment_loaded = false;
        }

        signals.count_isr();
        self.unstep(engine);
    }

    fn emit_step<E: StepEngine + ?Sized>(&mut self, engine: &mut E) {
        if self.dir_outbits != self.previous_dir {
            self.previous_dir = self.dir_outbits;
            for (axis, pins) in self.axes.iter().enumerate() {
                let reverse = self.dir_outbits & (1 << axis) != 0;
                engine.set_dir_pin(pins.dir_pin, reverse != pins.dir_invert);
            }
            engine.finish_dir();
        }

        engine.start_step();
        for (axis, pins) in self.axes.iter().enumerate() {
            if self.step_outbits & (1 << axis) != 0 {
                engine.set_step_pin(pins.step, true);
            }
        }
        engine.finish_step();
    }

    fn unstep<E: StepEngine + ?Sized>(&mut self, engine: &mut E) {
        if engine.start_unstep() == UnstepAction::Skip {
            return;
        }
        for pins in self.axes.iter() {
            engine.set_step_pin(pins.step, false);
        }
        engine.finish_unstep();
    }

    /// Stop the step timer and clear the outputs.
    pub fn stop_stepping<E: StepEngine + ?Sized>(&mut self, engine: &mut E) {
        engine.stop_timer();
        self.unstep(engine);
        self.step_outbits = 0;
    }

    /// Signed step position of each motor.
    pub fn motor_steps(&self) -> [i32; MAX_AXES] {
        self.motor_steps
    }

    /// Motor positions latched by the last probe trip.
    pub fn probe_steps(&self) -> [i32; MAX_AXES] {
        self.probe_steps
    }

    /// Overwrite motor positions, e.g. after homing.
    pub fn set_motor_steps(&mut self, steps: [i32; MAX_AXES]) {
        self.motor_steps = steps;
    }

    /// Step bits computed for the next tick.
    pub fn step_outbits(&self) -> AxisMask {
        self.step_outbits
    }

    /// A segment is being executed.
    pub fn is_busy(&self) -> bool {
        self.segment_loaded
    }

    /// Drop the executing segment and Bresenham state.
    ///
    /// Motor positions and attached axes are kept.
    pub fn reset(&mut self) {
        *self = Self {
            axes: core::mem::take(&mut self.axes),
            motor_steps: self.motor_steps,
            probe_steps: self.probe_steps,
            ..Self::new()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SegmentBuffers;
    use crate::engine::{EngineState, EngineTiming};
    use crate::motion::block::{PlannerBlock, Segment};
    use core::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Dir(u8, bool),
        FinishDir,
        Step(u8, bool),
        Ticks(u32),
        Stop,
    }

    #[derive(Default)]
    struct Recorder {
        events: heapless::Vec<Event, 256>,
        skip_unstep: bool,
    }

    impl StepEngine for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn init(&mut self, timing: EngineTiming) -> Result<u32> {
            Ok(timing.pulse_us)
        }
        fn init_step_pin(&mut self, pin: u8, inverted: bool) -> Result<StepPinHandle> {
            Ok(StepPinHandle::new(pin, inverted))
        }
        fn set_dir_pin(&mut self, pin: u8, level: bool) {
            let _ = self.events.push(Event::Dir(pin, level));
        }
        fn finish_dir(&mut self) {
            let _ = self.events.push(Event::FinishDir);
        }
        fn start_step(&mut self) {}
        fn set_step_pin(&mut self, pin: StepPinHandle, active: bool) {
            let _ = self.events.push(Event::Step(pin.id(), active));
        }
        fn finish_step(&mut self) {}
        fn start_unstep(&mut self) -> UnstepAction {
            if self.skip_unstep {
                UnstepAction::Skip
            } else {
                UnstepAction::Continue
            }
        }
        fn finish_unstep(&mut self) {}
        fn max_pulses_per_sec(&self) -> u32 {
            u32::MAX
        }
        fn set_timer_ticks(&mut self, ticks: u32) {
            let _ = self.events.push(Event::Ticks(ticks));
        }
        fn start_timer(&mut self) {}
        fn stop_timer(&mut self) {
            let _ = self.events.push(Event::Stop);
        }
        fn state(&self) -> EngineState {
            EngineState::Initialized
        }
        fn park(&mut self) {}
    }

    impl Recorder {
        fn step_count(&self, pin: u8) -> usize {
            self.events
                .iter()
                .filter(|e| **e == Event::Step(pin, true))
                .count()
        }
    }

    #[derive(Default)]
    struct Spin(Cell<u32>);

    impl Spindle for Spin {
        fn map_speed(&self, speed: f32) -> u32 {
            speed as u32
        }
        fn set_speed_from_isr(&self, dev_speed: u32) {
            self.0.set(dev_speed);
        }
    }

    struct Switch(Cell<bool>);

    impl Probe for Switch {
        fn tripped(&self) -> bool {
            self.0.get()
        }
    }

    fn executor(n: u8) -> PulseExecutor {
        let mut ex = PulseExecutor::new();
        for axis in 0..n {
            ex.attach_axis(AxisPins {
                step: StepPinHandle::new(axis, false),
                dir_pin: 10 + axis,
                dir_invert: axis == 1,
            })
            .unwrap();
        }
        ex
    }

    fn segment(n_step: u32, block_index: u8, amass_level: u8) -> Segment {
        Segment {
            n_step,
            isr_period: 500,
            block_index,
            amass_level,
            ..Default::default()
        }
    }

    #[test]
    fn test_traces_line_and_signals_cycle_stop() {
        let block = PlannerBlock::from_deltas(&[4, -2], 1.0, 1000.0, 100.0);
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, StepperBlockData::from_planner(&block, 2));
        producer.push(segment(4, 1, 0)).unwrap();

        let mut ex = executor(2);
        let mut engine = Recorder::default();
        let signals = Signals::new();
        let probe = Switch(Cell::new(false));
        let spindle = Spin::default();

        for _ in 0..6 {
            ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        }

        assert_eq!(engine.step_count(0), 4);
        assert_eq!(engine.step_count(1), 2);
        assert_eq!(ex.motor_steps()[..2], [4, -2]);
        assert!(signals.cycle_stop());
        assert!(engine.events.contains(&Event::Stop));
        assert!(engine.events.contains(&Event::Ticks(500)));
        assert_eq!(signals.isr_count(), 4);
    }

    #[test]
    fn test_direction_written_once_with_inversion() {
        let block = PlannerBlock::from_deltas(&[-3, -3], 1.0, 1000.0, 100.0);
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, StepperBlockData::from_planner(&block, 2));
        producer.push(segment(3, 1, 0)).unwrap();

        let mut ex = executor(2);
        let mut engine = Recorder::default();
        let signals = Signals::new();
        for _ in 0..4 {
            ex.pulse(&mut engine, &mut consumer, &Spin::default(), &Switch(Cell::new(false)), &signals);
        }

        let dirs: heapless::Vec<Event, 16> = engine
            .events
            .iter()
            .copied()
            .filter(|e| matches!(e, Event::Dir(..)))
            .collect();
        // First tick forces the idle pattern out, then the block's pattern once
        assert_eq!(
            dirs.as_slice(),
            &[
                Event::Dir(10, false),
                Event::Dir(11, true),
                Event::Dir(10, true),
                Event::Dir(11, false),
            ]
        );
    }

    #[test]
    fn test_amass_preserves_step_count() {
        let block = PlannerBlock::from_deltas(&[5, 3, 1], 1.0, 1000.0, 100.0);
        let data = StepperBlockData::from_planner(&block, 3);
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, data);
        producer.push(segment(2 << 2, 1, 2)).unwrap();
        producer.push(segment(3 << 3, 1, 3)).unwrap();

        let mut ex = executor(3);
        let mut engine = Recorder::default();
        let signals = Signals::new();
        for _ in 0..(8 + 24 + 1) {
            ex.pulse(&mut engine, &mut consumer, &Spin::default(), &Switch(Cell::new(false)), &signals);
        }
        assert_eq!(ex.motor_steps()[..3], [5, 3, 1]);
    }

    #[test]
    fn test_new_block_resets_counters() {
        let a = PlannerBlock::from_deltas(&[3], 1.0, 1000.0, 100.0);
        let b = PlannerBlock::from_deltas(&[-2], 1.0, 1000.0, 100.0);
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, StepperBlockData::from_planner(&a, 1));
        producer.store_block(2, StepperBlockData::from_planner(&b, 1));
        producer.push(segment(3, 1, 0)).unwrap();
        producer.push(segment(2, 2, 0)).unwrap();

        let mut ex = executor(1);
        let mut engine = Recorder::default();
        let signals = Signals::new();
        for _ in 0..6 {
            ex.pulse(&mut engine, &mut consumer, &Spin::default(), &Switch(Cell::new(false)), &signals);
        }
        assert_eq!(ex.motor_steps()[0], 1);
        assert!(signals.cycle_stop());
    }

    #[test]
    fn test_probe_latches_positions_once() {
        let block = PlannerBlock::from_deltas(&[6], 1.0, 1000.0, 100.0);
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, StepperBlockData::from_planner(&block, 1));
        producer.push(segment(6, 1, 0)).unwrap();

        let mut ex = executor(1);
        let mut engine = Recorder::default();
        let signals = Signals::new();
        let probe = Switch(Cell::new(false));
        let spindle = Spin::default();
        signals.arm_probe();

        for _ in 0..3 {
            ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        }
        probe.0.set(true);
        ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        assert!(signals.take_motion_cancel());
        assert!(!signals.probe_armed());
        let latched = ex.probe_steps()[0];
        assert_eq!(latched, 3);

        ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        assert!(!signals.motion_cancel());
        assert_eq!(ex.probe_steps()[0], latched);
    }

    #[test]
    fn test_spindle_follows_segments_and_zeroes_rate_adjusted() {
        let block = PlannerBlock::from_deltas(&[2], 1.0, 1000.0, 100.0);
        let mut data = StepperBlockData::from_planner(&block, 1);
        data.is_pwm_rate_adjusted = true;
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, data);
        producer
            .push(Segment {
                spindle_dev_speed: 321,
                ..segment(2, 1, 0)
            })
            .unwrap();

        let mut ex = executor(1);
        let mut engine = Recorder::default();
        let signals = Signals::new();
        let spindle = Spin::default();
        let probe = Switch(Cell::new(false));
        ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        assert_eq!(spindle.0.get(), 321);
        ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        ex.pulse(&mut engine, &mut consumer, &spindle, &probe, &signals);
        assert_eq!(spindle.0.get(), 0);
    }

    #[test]
    fn test_skip_unstep_engine_gets_no_deassert() {
        let block = PlannerBlock::from_deltas(&[2], 1.0, 1000.0, 100.0);
        let mut buffers: SegmentBuffers<4> = SegmentBuffers::new();
        let (mut producer, mut consumer) = buffers.split();
        producer.store_block(1, StepperBlockData::from_planner(&block, 1));
        producer.push(segment(2, 1, 0)).unwrap();

        let mut ex = executor(1);
        let mut engine = Recorder {
            skip_unstep: true,
            ..Default::default()
        };
        let signals = Signals::new();
        for _ in 0..3 {
            ex.pulse(&mut engine, &mut consumer, &Spin::default(), &Switch(Cell::new(false)), &signals);
        }
        assert!(!engine.events.contains(&Event::Step(0, false)));
        assert_eq!(engine.step_count(0), 2);
    }

    #[test]
    fn test_reset_keeps_axes_and_position() {
        let mut ex = executor(2);
        ex.set_motor_steps([7, -3, 0, 0, 0, 0]);
        ex.reset();
        assert_eq!(ex.axes().len(), 2);
        assert_eq!(ex.motor_steps()[..2], [7, -3]);
        assert!(!ex.is_busy());
    }
}
