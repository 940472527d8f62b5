//! The periodic tick driver.
//!
//! One [`ControlLoop`] owns the controller, the command sink, and a clock; a
//! host loop polls [`update`](ControlLoop::update) and the driver runs one
//! controller iteration per elapsed period, passing the measured (not
//! nominal) elapsed time as `dt`.

use crate::controller::FlightController;
use crate::hal::{CommandSink, FrameError, FrameResolver};
use embedded_time::{clock, duration::Microseconds, Clock, ConversionError};

/// Default startup wait for the localization stack, in microseconds.
pub const DEFAULT_FRAME_WAIT: Microseconds<u32> = Microseconds(10_000_000);

/// Default consecutive resolution misses tolerated once running; five
/// seconds at the customary 50 Hz.
pub const DEFAULT_FRAME_MISS_LIMIT: u32 = 250;

/// A control-loop error caused by clock timing or by frame resolution
/// failing for longer than the loop tolerates.
#[derive(Debug)]
pub enum Error {
    Clock(clock::Error),
    Time(ConversionError),
    Frame(FrameError),
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}

impl From<FrameError> for Error {
    fn from(frame_error: FrameError) -> Self {
        Error::Frame(frame_error)
    }
}

/// Drives a [`FlightController`] at a fixed frequency from a monotonic
/// clock, publishing each tick's command to the sink.
pub struct ControlLoop<C, R, S> {
    pub controller: FlightController<R>,
    pub sink: S,
    /// Consecutive resolution misses past which [`update`](Self::update)
    /// returns fatally.
    pub frame_miss_limit: u32,
    clock: C,
    loop_period_us: u32,
    last_tick_us: Option<u32>,
    frame_misses: u32,
}

impl<C, R, S> ControlLoop<C, R, S>
where
    C: Clock<T = u32>,
    R: FrameResolver,
    S: CommandSink,
{
    pub fn new(controller: FlightController<R>, sink: S, clock: C, frequency: f32) -> Self {
        Self {
            controller,
            sink,
            frame_miss_limit: DEFAULT_FRAME_MISS_LIMIT,
            clock,
            loop_period_us: (1_000_000.0 / frequency) as u32,
            last_tick_us: None,
            frame_misses: 0,
        }
    }

    /// Poll the resolver until it produces a pose or `timeout` passes.
    ///
    /// Startup precondition: localization that never comes up within the
    /// wait is fatal, where the same failure mid-flight is retryable.
    pub fn wait_for_frames(&mut self, timeout: Microseconds<u32>) -> Result<(), Error> {
        let start = self.micros_since_epoch()?.0;

        loop {
            if self.controller.resolver.vehicle_pose().is_ok() {
                return Ok(());
            }

            let now = self.micros_since_epoch()?.0;
            if now.wrapping_sub(start) >= timeout.0 {
                return Err(Error::Frame(FrameError::TimedOut));
            }
        }
    }

    /// Run one tick if a full period has elapsed; returns whether one ran.
    ///
    /// The elapsed time between loop starts is measured and handed to the
    /// controller as `dt`. A tick whose frame resolution fails publishes
    /// nothing and is skipped; after `frame_miss_limit` consecutive misses
    /// the failure is returned as fatal.
    pub fn update(&mut self) -> Result<bool, Error> {
        let now = self.micros_since_epoch()?.0;

        let last = match self.last_tick_us {
            Some(last) => last,
            None => {
                // First poll arms the timer; there is no elapsed time to
                // measure yet.
                self.last_tick_us = Some(now);
                return Ok(false);
            }
        };

        let elapsed = now.wrapping_sub(last);
        if elapsed < self.loop_period_us {
            return Ok(false);
        }

        self.last_tick_us = Some(now);
        let dt = elapsed as f32 * 1.0e-6;

        match self.controller.iteration(dt) {
            Ok(command) => {
                self.frame_misses = 0;
                self.sink.publish(command);
            }
            Err(error) => {
                self.frame_misses += 1;
                log::warn!("frame resolution failed, skipping tick: {:?}", error);
                if self.frame_misses > self.frame_miss_limit {
                    return Err(error.into());
                }
            }
        }

        Ok(true)
    }

    fn micros_since_epoch(&mut self) -> Result<Microseconds<u32>, Error> {
        let instant = self.clock.try_now()?;
        Microseconds::try_from(instant.duration_since_epoch()).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, PidGains};
    use crate::controller::FlightState;
    use crate::nav::{Pose, VelocityCommand};
    use approx::assert_abs_diff_eq;
    use core::sync::atomic::{AtomicU32, Ordering};
    use embedded_time::fraction::Fraction;
    use embedded_time::Instant;
    use nalgebra::{UnitQuaternion, Vector3};

    /// A settable microsecond clock; `step` auto-advances it per read so
    /// polling loops make progress.
    struct FakeClock<'a> {
        now: &'a AtomicU32,
        step: u32,
    }

    impl Clock for FakeClock<'_> {
        type T = u32;
        const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

        fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
            Ok(Instant::new(self.now.fetch_add(self.step, Ordering::Relaxed)))
        }
    }

    struct RecordingSink {
        last: Option<VelocityCommand>,
        published: usize,
    }

    impl CommandSink for RecordingSink {
        fn publish(&mut self, command: VelocityCommand) {
            self.last = Some(command);
            self.published += 1;
        }
    }

    struct FakeFrames {
        pose: Pose,
        fail: bool,
    }

    impl FrameResolver for FakeFrames {
        fn vehicle_pose(&mut self) -> Result<Pose, FrameError> {
            if self.fail {
                return Err(FrameError::Unavailable);
            }
            Ok(self.pose)
        }

        fn to_body_frame(&mut self, target: &Pose) -> Result<Pose, FrameError> {
            if self.fail {
                return Err(FrameError::Unavailable);
            }
            let inverse = self.pose.orientation.inverse();
            Ok(Pose::new(
                inverse * (target.position - self.pose.position),
                inverse * target.orientation,
            ))
        }
    }

    fn gains() -> PidGains {
        PidGains {
            kp: 1.0,
            kd: 0.1,
            ki: 5.0,
            min_output: -30.0,
            max_output: 30.0,
            integrator_min: -100.0,
            integrator_max: 100.0,
        }
    }

    fn config() -> ControllerConfig {
        ControllerConfig {
            world_frame: "/world",
            body_frame: "/crazyflie",
            frequency: 50.0,
            x: gains(),
            y: gains(),
            z: gains(),
            yaw: gains(),
        }
    }

    fn control_loop<'a>(
        ticks: &'a AtomicU32,
        step: u32,
        fail: bool,
    ) -> ControlLoop<FakeClock<'a>, FakeFrames, RecordingSink> {
        let resolver = FakeFrames {
            pose: Pose::new(Vector3::zeros(), UnitQuaternion::identity()),
            fail,
        };
        let controller = FlightController::new(&config(), resolver).unwrap();
        let sink = RecordingSink {
            last: None,
            published: 0,
        };
        ControlLoop::new(controller, sink, FakeClock { now: ticks, step }, 50.0)
    }

    #[test]
    fn first_poll_arms_without_a_tick() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 0, false);

        assert!(!control_loop.update().unwrap());
        assert_eq!(control_loop.sink.published, 0);
    }

    #[test]
    fn sub_period_polls_do_not_tick() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 0, false);
        control_loop.update().unwrap();

        ticks.store(10_000, Ordering::Relaxed);
        assert!(!control_loop.update().unwrap());
        assert_eq!(control_loop.sink.published, 0);
    }

    #[test]
    fn tick_uses_measured_elapsed_time_as_dt() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 0, false);
        control_loop.controller.state = FlightState::TakingOff {
            start: Vector3::zeros(),
            thrust: 0.0,
        };
        control_loop.update().unwrap();

        // A late tick: 30 ms instead of the nominal 20.
        ticks.store(30_000, Ordering::Relaxed);
        assert!(control_loop.update().unwrap());

        let command = control_loop.sink.last.unwrap();
        assert_abs_diff_eq!(command.linear.z, 14500.0 * 0.03, epsilon = 1e-1);
    }

    #[test]
    fn idle_ticks_publish_zero_commands() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 0, false);
        control_loop.update().unwrap();

        ticks.store(20_000, Ordering::Relaxed);
        control_loop.update().unwrap();

        assert_eq!(control_loop.sink.published, 1);
        assert_eq!(control_loop.sink.last, Some(VelocityCommand::default()));
    }

    #[test]
    fn resolution_misses_skip_then_turn_fatal() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 0, true);
        control_loop.controller.state = FlightState::StationKeeping;
        control_loop.frame_miss_limit = 2;
        control_loop.update().unwrap();

        for tick in 1..=2 {
            ticks.store(tick * 20_000, Ordering::Relaxed);
            assert!(control_loop.update().unwrap());
        }
        assert_eq!(control_loop.sink.published, 0);

        ticks.store(60_000, Ordering::Relaxed);
        assert!(matches!(
            control_loop.update(),
            Err(Error::Frame(FrameError::Unavailable))
        ));
    }

    #[test]
    fn a_success_resets_the_miss_count() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 0, true);
        control_loop.controller.state = FlightState::StationKeeping;
        control_loop.frame_miss_limit = 2;
        control_loop.update().unwrap();

        ticks.store(20_000, Ordering::Relaxed);
        control_loop.update().unwrap();

        control_loop.controller.resolver.fail = false;
        ticks.store(40_000, Ordering::Relaxed);
        control_loop.update().unwrap();
        assert_eq!(control_loop.sink.published, 1);

        // Two more misses stay within the limit again.
        control_loop.controller.resolver.fail = true;
        ticks.store(60_000, Ordering::Relaxed);
        assert!(control_loop.update().is_ok());
        ticks.store(80_000, Ordering::Relaxed);
        assert!(control_loop.update().is_ok());
    }

    #[test]
    fn wait_for_frames_returns_once_available() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 1_000, false);
        assert!(control_loop.wait_for_frames(DEFAULT_FRAME_WAIT).is_ok());
    }

    #[test]
    fn wait_for_frames_times_out() {
        let ticks = AtomicU32::new(0);
        let mut control_loop = control_loop(&ticks, 1_000, true);
        assert!(matches!(
            control_loop.wait_for_frames(Microseconds(50_000)),
            Err(Error::Frame(FrameError::TimedOut))
        ));
    }
}
