use crate::config::PidGains;
use crate::constrain_float;

/// A single-axis proportional-integral-derivative loop with a clamped
/// integrator and a clamped output.
///
/// The loop carries no clock of its own: `dt` is passed to every
/// [`update`](Pid::update) call by the tick driver. One instance exists per
/// controlled axis (x, y, z, yaw).
#[derive(Clone, Copy, Debug)]
pub struct Pid {
    pub kp: f32,
    pub kd: f32,
    pub ki: f32,
    pub min_output: f32,
    pub max_output: f32,
    pub integrator_min: f32,
    pub integrator_max: f32,
    integral: f32,
    previous_error: f32,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            kp: gains.kp,
            kd: gains.kd,
            ki: gains.ki,
            min_output: gains.min_output,
            max_output: gains.max_output,
            integrator_min: gains.integrator_min,
            integrator_max: gains.integrator_max,
            integral: 0.0,
            previous_error: 0.0,
        }
    }

    /// Run one update against the measurement and return the clamped output.
    ///
    /// The integrator is clamped after every accumulation so saturation
    /// cannot wind it up. A non-positive `dt` (the first tick) contributes
    /// zero derivative instead of dividing by zero.
    pub fn update(&mut self, setpoint: f32, measurement: f32, dt: f32) -> f32 {
        let error = setpoint - measurement;

        self.integral = constrain_float(
            self.integral + error * dt,
            self.integrator_min,
            self.integrator_max,
        );

        let derivative = if dt > 0.0 {
            (error - self.previous_error) / dt
        } else {
            0.0
        };
        self.previous_error = error;

        let raw = self.kp * error + self.kd * derivative + self.ki * self.integral;
        constrain_float(raw, self.min_output, self.max_output)
    }

    /// Zero the integrator and the stored error, dropping any history from
    /// before a discontinuous setpoint change.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }

    /// Overwrite the integrator directly.
    ///
    /// Used once per flight, at the end of the takeoff ramp: pre-loading the
    /// vertical loop with the discovered hover thrust keeps the switch to
    /// closed-loop altitude hold step-free.
    pub fn set_integral(&mut self, value: f32) {
        self.integral = value;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }
}
