//! Closed-loop toy flight: scripted takeoff, station-keeping at a goal a
//! meter up, then a scripted landing, against a crude kinematic vehicle.
//!
//! Run with `cargo run --example station_keeping`.

use embedded_time::clock;
use embedded_time::fraction::Fraction;
use embedded_time::{Clock, Instant};
use hover_flight::{
    scheduler::DEFAULT_FRAME_WAIT, CommandSink, ControlLoop, ControllerConfig, FlightController,
    FlightState, FrameError, FrameResolver, PidGains, Pose, VelocityCommand,
};
use nalgebra::{UnitQuaternion, Vector3};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Tick period of the simulation, seconds.
const DT: f32 = 0.02;

/// Thrust command that balances gravity in the toy vehicle model.
const HOVER_THRUST: f32 = 36_000.0;

struct Vehicle {
    position: Vector3<f32>,
    velocity: Vector3<f32>,
}

impl Vehicle {
    /// Crude kinematics: lateral commands map to lateral speed, vertical
    /// thrust above hover maps to climb rate, and the floor is solid.
    fn apply(&mut self, command: VelocityCommand) {
        self.velocity = Vector3::new(
            0.05 * command.linear.x,
            0.05 * command.linear.y,
            (command.linear.z - HOVER_THRUST) / 40_000.0,
        );
        self.position += self.velocity * DT;

        if self.position.z <= 0.0 {
            self.position.z = 0.0;
            self.velocity.z = self.velocity.z.max(0.0);
        }
    }
}

struct SimFrames {
    vehicle: Rc<RefCell<Vehicle>>,
}

impl FrameResolver for SimFrames {
    fn vehicle_pose(&mut self) -> Result<Pose, FrameError> {
        Ok(Pose::new(
            self.vehicle.borrow().position,
            UnitQuaternion::identity(),
        ))
    }

    fn to_body_frame(&mut self, target: &Pose) -> Result<Pose, FrameError> {
        let position = self.vehicle.borrow().position;
        Ok(Pose::new(target.position - position, target.orientation))
    }
}

struct SimActuation {
    vehicle: Rc<RefCell<Vehicle>>,
}

impl CommandSink for SimActuation {
    fn publish(&mut self, command: VelocityCommand) {
        self.vehicle.borrow_mut().apply(command);
    }
}

/// A clock that advances one tick period per read.
#[derive(Default)]
struct SimClock {
    micros: Cell<u32>,
}

impl Clock for SimClock {
    type T = u32;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        let now = self.micros.get();
        self.micros.set(now + (DT * 1e6) as u32);
        Ok(Instant::new(now))
    }
}

/// Gains in the sign convention of `Pid::update(0.0, body_error)`: the loop
/// error is the negated body-frame offset, so gains that should drive the
/// vehicle toward the target are negative.
fn config() -> ControllerConfig {
    let lateral = PidGains {
        kp: -25.0,
        kd: -10.0,
        ki: -1.0,
        min_output: -20.0,
        max_output: 20.0,
        integrator_min: -50.0,
        integrator_max: 50.0,
    };

    ControllerConfig {
        world_frame: "/world",
        body_frame: "/crazyflie",
        frequency: 1.0 / DT,
        x: lateral,
        y: lateral,
        z: PidGains {
            kp: -5000.0,
            kd: -6000.0,
            ki: -3500.0,
            min_output: 10_000.0,
            max_output: 60_000.0,
            integrator_min: -20.0,
            integrator_max: 0.0,
        },
        yaw: PidGains {
            kp: -200.0,
            kd: -20.0,
            ki: 0.0,
            min_output: -200.0,
            max_output: 200.0,
            integrator_min: -17.0,
            integrator_max: 17.0,
        },
    }
}

fn main() {
    let vehicle = Rc::new(RefCell::new(Vehicle {
        position: Vector3::zeros(),
        velocity: Vector3::zeros(),
    }));

    let config = config();
    let controller = FlightController::new(
        &config,
        SimFrames {
            vehicle: vehicle.clone(),
        },
    )
    .expect("config should validate");

    let mut control_loop = ControlLoop::new(
        controller,
        SimActuation {
            vehicle: vehicle.clone(),
        },
        SimClock::default(),
        config.frequency,
    );

    control_loop
        .wait_for_frames(DEFAULT_FRAME_WAIT)
        .expect("localization should come up");

    control_loop.controller.set_goal(Pose::new(
        Vector3::new(0.5, -0.5, 1.0),
        UnitQuaternion::identity(),
    ));
    control_loop.controller.takeoff().expect("pose is available");

    for step in 0..3500 {
        let feedback = vehicle.borrow().velocity;
        control_loop.controller.set_velocity_feedback(feedback);
        control_loop.update().expect("simulated tick");

        if step == 2000 {
            control_loop.controller.land();
        }

        if step % 100 == 0 {
            let position = vehicle.borrow().position;
            println!(
                "t={:6.2}s {} position=({:.3}, {:.3}, {:.3})",
                step as f32 * DT,
                mode_name(&control_loop.controller.state),
                position.x,
                position.y,
                position.z,
            );
        }
    }

    assert_eq!(control_loop.controller.state, FlightState::Idle);
    println!("landed");
}

fn mode_name(state: &FlightState) -> &'static str {
    match state {
        FlightState::Idle => "Idle",
        FlightState::TakingOff { .. } => "TakingOff",
        FlightState::Ascending { .. } => "Ascending",
        FlightState::StationKeeping => "StationKeeping",
        FlightState::Landing => "Landing",
    }
}
