//! # hover-flight
//! A `#![no_std]` flight controller library for small quadrotors: scripted
//! takeoff, closed-loop station-keeping at a goal pose, and scripted landing.
//!
//! # Generic components
//! [`pid`] contains the single-axis PID loop used for all four control axes.
//!
//! [`hal`] contains the traits for the external collaborators: pose/frame
//! resolution and velocity-command output.
//!
//! # Controller components
//! [`FlightController`] is the flight-state machine: it reads the latest goal
//! and pose each tick and produces exactly one [`VelocityCommand`].
//!
//! [`avoidance`](controller::avoidance) contains the quadrant heuristic used
//! for large lateral errors during station-keeping.
//!
//! [`ControlLoop`] drives the controller at a fixed frequency from an
//! [`embedded_time::Clock`] and publishes each command to a
//! [`CommandSink`](hal::CommandSink).

#![no_std]

pub mod config;
pub use config::{ConfigError, ControllerConfig, PidGains};

pub mod controller;
pub use controller::{FlightController, FlightState};

pub mod hal;
pub use hal::{CommandSink, FrameError, FrameResolver};

pub mod nav;
pub use nav::{Pose, VelocityCommand};

pub mod pid;
pub use pid::Pid;

pub mod scheduler;
pub use scheduler::{ControlLoop, Error};

/// Clamp `amt` to `[low, high]`; a NaN input maps to the interval midpoint
/// rather than escaping to an actuator.
pub(crate) fn constrain_float(amt: f32, low: f32, high: f32) -> f32 {
    if amt.is_nan() {
        return (low + high) / 2.0;
    }

    if amt < low {
        return low;
    }

    if amt > high {
        return high;
    }

    amt
}

pub(crate) fn fabs(v: f32) -> f32 {
    num_traits::Float::abs(v)
}
