//! The stepper core: segment buffers, preparer, executor and step engine
//! wired together.
//!
//! On a single-context host every operation is available on [`StepperCore`]
//! directly. On a target where the executor runs in a timer interrupt, call
//! [`StepperCore::split`] and hand the [`Interrupt`] half to the interrupt
//! handler; the [`Background`] half stays with the protocol loop. The two
//! halves share only the segment ring, the block arena and [`Signals`].

use embedded_hal::delay::DelayNs;

use crate::buffer::{SegmentBuffers, SegmentConsumer, SegmentProducer};
use crate::config::{validate_config, SystemConfig, IDLE_MS_NEVER_DISABLE};
use crate::engine::{EngineState, StepEngine};
use crate::error::Result;
use crate::machine::{MachineState, MotorDrivers, Planner, Probe, Signals, Spindle, StepControl};
use crate::motion::{AxisPins, PulseExecutor, SegmentPreparer, MAX_AXES};

/// Segment-stepping core over step engine `E` with an `N`-slot segment ring.
pub struct StepperCore<E, const N: usize> {
    engine: E,
    buffers: SegmentBuffers<N>,
    preparer: SegmentPreparer,
    executor: PulseExecutor,
    signals: Signals,
    idle_ms: u32,
    disable_delay_us: u32,
    pulse_us: u32,
    low_latency: bool,
}

impl<E: StepEngine, const N: usize> StepperCore<E, N> {
    /// Initialize the engine and attach every configured axis.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the engine rejects
    /// the timing or a step pin.
    pub fn new(mut engine: E, config: &SystemConfig) -> Result<Self> {
        validate_config(config)?;
        let stepping = &config.stepping;

        let pulse_us = engine.init(stepping.timing())?;
        info!(
            "step engine {}: pulse {}us requested, {}us actual, max {} pulses/s",
            engine.name(),
            stepping.pulse_us,
            pulse_us,
            engine.max_pulses_per_sec()
        );
        if pulse_us != stepping.pulse_us {
            warn!("step pulse rounded to {}us", pulse_us);
        }

        let mut executor = PulseExecutor::new();
        for axis in config.axes.iter() {
            let step = engine.init_step_pin(axis.step_pin, axis.step_invert)?;
            executor.attach_axis(AxisPins {
                step,
                dir_pin: axis.dir_pin,
                dir_invert: axis.dir_invert,
            })?;
        }
        debug!(
            "{} axes attached, enable delay {}us, idle {}ms",
            config.axes.len(),
            stepping.disable_delay_us,
            stepping.idle_ms
        );

        Ok(Self {
            engine,
            buffers: SegmentBuffers::new(),
            preparer: SegmentPreparer::new(config.axes.len(), stepping),
            executor,
            signals: Signals::new(),
            idle_ms: stepping.idle_ms,
            disable_delay_us: stepping.disable_delay_us,
            pulse_us,
            low_latency: false,
        })
    }

    /// Fill the segment ring from the planner.
    pub fn prep_buffer<P, S>(&mut self, planner: &mut P, spindle: &S, control: &mut StepControl)
    where
        P: Planner + ?Sized,
        S: Spindle + ?Sized,
    {
        let (mut producer, _) = self.buffers.split();
        self.preparer
            .prep_buffer(planner, spindle, control, &mut producer);
    }

    /// One step timer tick.
    pub fn pulse_func<S, P>(&mut self, spindle: &S, probe: &P)
    where
        S: Spindle + ?Sized,
        P: Probe + ?Sized,
    {
        let (_, mut consumer) = self.buffers.split();
        self.executor.pulse(
            &mut self.engine,
            &mut consumer,
            spindle,
            probe,
            &self.signals,
        );
    }

    /// Refill interrupt entry point for FIFO-streaming engines.
    pub fn service_refill<S, P>(&mut self, spindle: &S, probe: &P)
    where
        S: Spindle + ?Sized,
        P: Probe + ?Sized,
    {
        let (_, mut consumer) = self.buffers.split();
        let executor = &mut self.executor;
        let signals = &self.signals;
        self.engine.service_refill(&mut |engine: &mut dyn StepEngine| {
            executor.pulse(engine, &mut consumer, spindle, probe, signals)
        });
    }

    /// Enable the drivers, wait out `disable_delay_us`, and start the step
    /// timer.
    pub fn wake_up<D, T>(&mut self, drivers: &mut D, delay: &mut T)
    where
        D: MotorDrivers + ?Sized,
        T: DelayNs,
    {
        info!("stepper wake up");
        enable_drivers(drivers, delay, self.disable_delay_us);
        self.engine.start_timer();
    }

    /// Switch the engine to low-latency output for homing or probing.
    ///
    /// Stepping stops if it is running. Has no effect on engines whose output
    /// is always immediate.
    pub fn begin_low_latency(&mut self) {
        if self.engine.state() == EngineState::Running {
            self.executor.stop_stepping(&mut self.engine);
        }
        if self.engine.set_low_latency(true) {
            self.low_latency = true;
            debug!("step engine {} switched to low latency", self.engine.name());
        }
    }

    /// Return the engine to the mode it had before [`begin_low_latency`].
    ///
    /// [`begin_low_latency`]: Self::begin_low_latency
    pub fn end_low_latency(&mut self) {
        if !self.low_latency {
            return;
        }
        if self.engine.state() == EngineState::Running {
            self.executor.stop_stepping(&mut self.engine);
        }
        self.engine.set_low_latency(false);
        self.low_latency = false;
        debug!("step engine {} switched back to streaming", self.engine.name());
    }

    /// Inside a [`begin_low_latency`](Self::begin_low_latency) window.
    pub fn is_low_latency(&self) -> bool {
        self.low_latency
    }

    /// Stop stepping, then disable the drivers after the idle delay unless
    /// the delay is configured as "never".
    pub fn go_idle<D, T>(&mut self, drivers: &mut D, delay: &mut T)
    where
        D: MotorDrivers + ?Sized,
        T: DelayNs,
    {
        self.executor.stop_stepping(&mut self.engine);
        if self.idle_ms != IDLE_MS_NEVER_DISABLE {
            delay.delay_ms(self.idle_ms);
            drivers.set_disable(true);
            info!("stepper idle, drivers disabled");
        } else {
            info!("stepper idle");
        }
    }

    /// Park the engine and clear all buffered and in-flight motion.
    ///
    /// Motor positions survive a reset.
    pub fn reset(&mut self) {
        self.engine.park();
        self.executor.stop_stepping(&mut self.engine);
        self.buffers.clear();
        self.preparer.reset();
        self.executor.reset();
        self.signals.clear();
        self.signals.disarm_probe();
        self.signals.reset_isr_count();
        info!("stepper reset");
    }

    /// See [`SegmentPreparer::update_plan_block_parameters`].
    pub fn update_plan_block_parameters<P: Planner + ?Sized>(&mut self, planner: &mut P) {
        self.preparer.update_plan_block_parameters(planner);
    }

    /// See [`SegmentPreparer::parking_setup_buffer`].
    pub fn parking_setup_buffer(&mut self) {
        self.preparer.parking_setup_buffer();
    }

    /// See [`SegmentPreparer::parking_restore_buffer`].
    pub fn parking_restore_buffer(&mut self) {
        self.preparer.parking_restore_buffer();
    }

    /// Speed of the most recently prepared segment, mm/min.
    pub fn get_realtime_rate(&self, state: MachineState) -> f32 {
        self.preparer.realtime_rate(state)
    }

    /// Flags raised from interrupt context.
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Latch motor positions on the next probe trip.
    pub fn arm_probe(&self) {
        self.signals.arm_probe();
    }

    /// Signed step position of each motor.
    pub fn motor_steps(&self) -> [i32; MAX_AXES] {
        self.executor.motor_steps()
    }

    /// Motor positions latched by the last probe trip.
    pub fn probe_steps(&self) -> [i32; MAX_AXES] {
        self.executor.probe_steps()
    }

    /// Segments waiting for the executor.
    pub fn segments_queued(&self) -> usize {
        self.buffers.len()
    }

    /// Pulse width the engine produces, microseconds.
    pub fn pulse_us(&self) -> u32 {
        self.pulse_us
    }

    /// The step engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The step engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The segment preparer.
    pub fn preparer(&self) -> &SegmentPreparer {
        &self.preparer
    }

    /// The pulse executor.
    pub fn executor(&self) -> &PulseExecutor {
        &self.executor
    }

    /// Split into a background half and an interrupt half that can run
    /// concurrently.
    pub fn split(&mut self) -> (Background<'_, N>, Interrupt<'_, E, N>) {
        let (producer, consumer) = self.buffers.split();
        (
            Background {
                preparer: &mut self.preparer,
                producer,
                signals: &self.signals,
            },
            Interrupt {
                engine: &mut self.engine,
                executor: &mut self.executor,
                consumer,
                signals: &self.signals,
                disable_delay_us: self.disable_delay_us,
            },
        )
    }
}

fn enable_drivers<D, T>(drivers: &mut D, delay: &mut T, disable_delay_us: u32)
where
    D: MotorDrivers + ?Sized,
    T: DelayNs,
{
    drivers.set_disable(false);
    if disable_delay_us > 0 {
        delay.delay_us(disable_delay_us);
    }
}

/// Background-context half of a split [`StepperCore`].
pub struct Background<'a, const N: usize> {
    preparer: &'a mut SegmentPreparer,
    producer: SegmentProducer<'a, N>,
    signals: &'a Signals,
}

impl<'a, const N: usize> Background<'a, N> {
    /// Fill the segment ring from the planner.
    pub fn prep_buffer<P, S>(&mut self, planner: &mut P, spindle: &S, control: &mut StepControl)
    where
        P: Planner + ?Sized,
        S: Spindle + ?Sized,
    {
        self.preparer
            .prep_buffer(planner, spindle, control, &mut self.producer);
    }

    /// See [`SegmentPreparer::update_plan_block_parameters`].
    pub fn update_plan_block_parameters<P: Planner + ?Sized>(&mut self, planner: &mut P) {
        self.preparer.update_plan_block_parameters(planner);
    }

    /// See [`SegmentPreparer::parking_setup_buffer`].
    pub fn parking_setup_buffer(&mut self) {
        self.preparer.parking_setup_buffer();
    }

    /// See [`SegmentPreparer::parking_restore_buffer`].
    pub fn parking_restore_buffer(&mut self) {
        self.preparer.parking_restore_buffer();
    }

    /// Speed of the most recently prepared segment, mm/min.
    pub fn get_realtime_rate(&self, state: MachineState) -> f32 {
        self.preparer.realtime_rate(state)
    }

    /// Segments waiting for the executor.
    pub fn segments_queued(&self) -> usize {
        self.producer.len()
    }

    /// Flags raised by the interrupt half.
    pub fn signals(&self) -> &Signals {
        self.signals
    }
}

/// Interrupt-context half of a split [`StepperCore`].
pub struct Interrupt<'a, E, const N: usize> {
    engine: &'a mut E,
    executor: &'a mut PulseExecutor,
    consumer: SegmentConsumer<'a, N>,
    signals: &'a Signals,
    disable_delay_us: u32,
}

impl<'a, E: StepEngine, const N: usize> Interrupt<'a, E, N> {
    /// One step timer tick.
    #[inline]
    pub fn pulse_func<S, P>(&mut self, spindle: &S, probe: &P)
    where
        S: Spindle + ?Sized,
        P: Probe + ?Sized,
    {
        self.executor
            .pulse(&mut *self.engine, &mut self.consumer, spindle, probe, self.signals);
    }

    /// Refill interrupt entry point for FIFO-streaming engines.
    pub fn service_refill<S, P>(&mut self, spindle: &S, probe: &P)
    where
        S: Spindle + ?Sized,
        P: Probe + ?Sized,
    {
        let executor = &mut *self.executor;
        let consumer = &mut self.consumer;
        let signals = self.signals;
        self.engine.service_refill(&mut |engine: &mut dyn StepEngine| {
            executor.pulse(engine, consumer, spindle, probe, signals)
        });
    }

    /// Enable the drivers, wait out `disable_delay_us`, and start the step
    /// timer.
    pub fn wake_up<D, T>(&mut self, drivers: &mut D, delay: &mut T)
    where
        D: MotorDrivers + ?Sized,
        T: DelayNs,
    {
        enable_drivers(drivers, delay, self.disable_delay_us);
        self.engine.start_timer();
    }

    /// Stop the step timer and clear the outputs.
    pub fn stop_stepping(&mut self) {
        self.executor.stop_stepping(&mut *self.engine);
    }

    /// Step timer is running.
    pub fn is_running(&self) -> bool {
        self.engine.state() == EngineState::Running
    }

    /// Signed step position of each motor.
    pub fn motor_steps(&self) -> [i32; MAX_AXES] {
        self.executor.motor_steps()
    }
}
