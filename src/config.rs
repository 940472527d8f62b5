/// A configuration parameter that failed startup validation.
///
/// The controller never runs with undefined gains; any of these is fatal
/// before the first tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A gain or limit is NaN or infinite; the field names the axis.
    NonFinite(&'static str),
    /// A min/max pair is inverted; the field names the axis.
    InvertedRange(&'static str),
    /// The tick frequency is zero, negative, or non-finite.
    BadFrequency,
    /// The vertical integral gain is zero; the takeoff bootstrap divides
    /// the accumulated thrust by it.
    ZeroVerticalKi,
}

/// The seven per-axis loop parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub kd: f32,
    pub ki: f32,
    pub min_output: f32,
    pub max_output: f32,
    pub integrator_min: f32,
    pub integrator_max: f32,
}

impl PidGains {
    fn validate(&self, axis: &'static str) -> Result<(), ConfigError> {
        let fields = [
            self.kp,
            self.kd,
            self.ki,
            self.min_output,
            self.max_output,
            self.integrator_min,
            self.integrator_max,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::NonFinite(axis));
        }

        if self.min_output > self.max_output || self.integrator_min > self.integrator_max {
            return Err(ConfigError::InvertedRange(axis));
        }

        Ok(())
    }
}

/// Startup configuration: frame identifiers, tick frequency, and one
/// [`PidGains`] set per controlled axis. Immutable once validated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Fixed reference frame for poses and goals, `"/world"` by convention.
    pub world_frame: &'static str,
    /// Vehicle-attached frame the control errors are expressed in.
    pub body_frame: &'static str,
    /// Tick frequency in hertz; 50 is the customary rate.
    pub frequency: f32,
    pub x: PidGains,
    pub y: PidGains,
    pub z: PidGains,
    pub yaw: PidGains,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(ConfigError::BadFrequency);
        }

        self.x.validate("x")?;
        self.y.validate("y")?;
        self.z.validate("z")?;
        self.yaw.validate("yaw")?;

        if self.z.ki == 0.0 {
            return Err(ConfigError::ZeroVerticalKi);
        }

        Ok(())
    }
}
