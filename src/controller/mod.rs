//! The flight-state machine and its per-tick command computation.

pub mod avoidance;

use crate::config::{ConfigError, ControllerConfig};
use crate::fabs;
use crate::hal::{FrameError, FrameResolver};
use crate::nav::{Pose, VelocityCommand};
use crate::pid::Pid;
use nalgebra::Vector3;

/// Thrust ramp rate during the open-loop takeoff spool, units per second.
const SPOOL_RATE: f32 = 14500.0;

/// Accumulated thrust past which the spool hands over even without liftoff.
const SPOOL_LIMIT: f32 = 50_000.0;

/// Altitude above the start altitude that counts as airborne, and below
/// which a landing counts as touched down.
const LIFTOFF_MARGIN: f32 = 0.05;

/// Per-axis squared position error below which the ascent is complete.
const HOVER_TOLERANCE: f32 = 0.05;

/// Body-frame lateral error magnitude past which avoidance takes over from
/// the lateral loops.
const LATERAL_LIMIT: f32 = 0.5;

/// The active flight mode. Each variant carries only the snapshot state that
/// mode consumes; anything decided during a tick takes effect on the next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlightState {
    /// On the ground, emitting explicit zero commands.
    Idle,
    /// Open-loop vertical thrust ramp from the snapshotted start position.
    TakingOff { start: Vector3<f32>, thrust: f32 },
    /// Closed-loop climb to the goal altitude above the takeoff x/y.
    Ascending { target: Pose },
    /// Holding the live goal pose.
    StationKeeping,
    /// Closed-loop descent to just above the start altitude.
    Landing,
}

/// The controller proper: four PID loops, the mode state, and the
/// last-value goal and velocity-feedback cells.
///
/// An external driver calls [`iteration`](FlightController::iteration) once
/// per tick with the measured elapsed time; every tick in every mode yields
/// exactly one command unless frame resolution fails, in which case the tick
/// is skipped.
pub struct FlightController<R> {
    pub resolver: R,
    pub pid_x: Pid,
    pub pid_y: Pid,
    pub pid_z: Pid,
    pub pid_yaw: Pid,
    pub state: FlightState,
    goal: Pose,
    velocity: Vector3<f32>,
    /// Altitude snapshotted at the takeoff trigger; Landing and the
    /// touchdown check need it long after the takeoff snapshot is gone.
    ground: f32,
}

impl<R: FrameResolver> FlightController<R> {
    /// Validate the configuration and build an idle controller.
    pub fn new(config: &ControllerConfig, resolver: R) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            resolver,
            pid_x: Pid::new(config.x),
            pid_y: Pid::new(config.y),
            pid_z: Pid::new(config.z),
            pid_yaw: Pid::new(config.yaw),
            state: FlightState::Idle,
            goal: Pose::default(),
            velocity: Vector3::zeros(),
            ground: 0.0,
        })
    }

    /// Replace the station-keeping goal. Last value wins; a non-finite
    /// sample is discarded.
    pub fn set_goal(&mut self, goal: Pose) {
        if !goal.is_finite() {
            log::warn!("discarding non-finite goal");
            return;
        }
        self.goal = goal;
    }

    pub fn goal(&self) -> Pose {
        self.goal
    }

    /// Replace the measured linear velocity used by the avoidance heuristic.
    pub fn set_velocity_feedback(&mut self, velocity: Vector3<f32>) {
        if !velocity.iter().all(|v| v.is_finite()) {
            log::warn!("discarding non-finite velocity feedback");
            return;
        }
        self.velocity = velocity;
    }

    pub fn velocity_feedback(&self) -> Vector3<f32> {
        self.velocity
    }

    /// Begin the takeoff sequence from the current pose.
    ///
    /// Snapshots the start position, zeroes the accumulated thrust, and
    /// resets all four loops. Triggering while airborne re-arms the sequence
    /// the same way. Fails without changing mode if the pose cannot be
    /// resolved.
    pub fn takeoff(&mut self) -> Result<(), FrameError> {
        log::info!("takeoff requested");
        let pose = self.resolver.vehicle_pose()?;

        self.pid_reset();
        self.ground = pose.position.z;
        self.state = FlightState::TakingOff {
            start: pose.position,
            thrust: 0.0,
        };

        Ok(())
    }

    /// Begin the landing sequence. Valid in any mode.
    pub fn land(&mut self) {
        log::info!("landing requested");
        self.state = FlightState::Landing;
    }

    /// Run one tick: read the pose, apply the active mode, and return the
    /// command for this tick. A [`FrameError`] means no command could be
    /// computed this cycle; the caller decides when repeated failures become
    /// fatal.
    pub fn iteration(&mut self, dt: f32) -> Result<VelocityCommand, FrameError> {
        match self.state {
            FlightState::Idle => Ok(VelocityCommand::default()),
            FlightState::TakingOff { start, thrust } => self.spool_tick(start, thrust, dt),
            FlightState::Ascending { target } => self.ascend_tick(target, dt),
            FlightState::StationKeeping => self.station_tick(dt),
            FlightState::Landing => self.landing_tick(dt),
        }
    }

    fn pid_reset(&mut self) {
        self.pid_x.reset();
        self.pid_y.reset();
        self.pid_z.reset();
        self.pid_yaw.reset();
    }

    /// Resolve a world-frame target into the body frame, screening out
    /// non-finite results before they reach a loop.
    fn resolve_target(&mut self, target: &Pose) -> Result<Pose, FrameError> {
        let body = self.resolver.to_body_frame(target)?;
        if !body.is_finite() {
            log::warn!("discarding non-finite resolved pose");
            return Err(FrameError::Unavailable);
        }
        Ok(body)
    }

    /// All four loops against a body-frame target, setpoint zero per axis.
    fn track(&mut self, body: &Pose, dt: f32) -> VelocityCommand {
        VelocityCommand {
            linear: Vector3::new(
                self.pid_x.update(0.0, body.position.x, dt),
                self.pid_y.update(0.0, body.position.y, dt),
                self.pid_z.update(0.0, body.position.z, dt),
            ),
            yaw_rate: self.pid_yaw.update(0.0, body.yaw(), dt),
        }
    }

    fn spool_tick(
        &mut self,
        start: Vector3<f32>,
        thrust: f32,
        dt: f32,
    ) -> Result<VelocityCommand, FrameError> {
        let pose = self.resolver.vehicle_pose()?;

        if pose.position.z > start.z + LIFTOFF_MARGIN || thrust > SPOOL_LIMIT {
            // Hand over to the closed loops: pre-load the vertical
            // integrator with the hover thrust the ramp discovered, and aim
            // for the goal altitude directly above the takeoff point.
            self.pid_reset();
            self.pid_z.set_integral(thrust / self.pid_z.ki);

            let target = Pose::new(
                Vector3::new(start.x, start.y, self.goal.position.z),
                self.goal.orientation,
            );
            self.state = FlightState::Ascending { target };
            log::info!("airborne, ascending to goal altitude");

            // Hold the final spool thrust for this tick; the bootstrapped
            // vertical loop continues from the same value next tick.
            Ok(VelocityCommand {
                linear: Vector3::new(0.0, 0.0, thrust),
                yaw_rate: 0.0,
            })
        } else {
            let thrust = thrust + SPOOL_RATE * dt;
            self.state = FlightState::TakingOff { start, thrust };

            Ok(VelocityCommand {
                linear: Vector3::new(0.0, 0.0, thrust),
                yaw_rate: 0.0,
            })
        }
    }

    fn ascend_tick(&mut self, target: Pose, dt: f32) -> Result<VelocityCommand, FrameError> {
        let body = self.resolve_target(&target)?;
        let command = self.track(&body, dt);

        let squared = body.position.component_mul(&body.position);
        if squared.x < HOVER_TOLERANCE && squared.y < HOVER_TOLERANCE && squared.z < HOVER_TOLERANCE
        {
            self.state = FlightState::StationKeeping;
            log::info!("goal altitude reached, holding station");
        }

        Ok(command)
    }

    fn station_tick(&mut self, dt: f32) -> Result<VelocityCommand, FrameError> {
        let goal = self.goal;
        let body = self.resolve_target(&goal)?;

        if fabs(body.position.x) > LATERAL_LIMIT || fabs(body.position.y) > LATERAL_LIMIT {
            let s_x = avoidance::slide_signal(body.position.x, self.velocity.x);
            let s_y = avoidance::slide_signal(body.position.y, self.velocity.y);
            let lateral = avoidance::quadrant_command(s_x, s_y);

            Ok(VelocityCommand {
                linear: Vector3::new(
                    lateral.x,
                    lateral.y,
                    self.pid_z.update(0.0, body.position.z, dt),
                ),
                yaw_rate: self.pid_yaw.update(0.0, body.yaw(), dt),
            })
        } else {
            Ok(self.track(&body, dt))
        }
    }

    fn landing_tick(&mut self, dt: f32) -> Result<VelocityCommand, FrameError> {
        let pose = self.resolver.vehicle_pose()?;

        if pose.position.z <= self.ground + LIFTOFF_MARGIN {
            self.state = FlightState::Idle;
            log::info!("touchdown");
            return Ok(VelocityCommand::default());
        }

        // Altitude pinned just above the start; x/y track the live goal.
        let target = Pose::new(
            Vector3::new(
                self.goal.position.x,
                self.goal.position.y,
                self.ground + LIFTOFF_MARGIN,
            ),
            self.goal.orientation,
        );
        let body = self.resolve_target(&target)?;

        Ok(self.track(&body, dt))
    }
}
