use nalgebra::{UnitQuaternion, Vector3};

/// A vehicle or goal pose: position in meters plus an orientation.
///
/// Poses arrive from the localization system in the world frame and are
/// expressed in the body frame by a [`FrameResolver`](crate::FrameResolver)
/// before the controller consumes them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl Pose {
    pub fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The yaw angle in radians, from the roll/pitch/yaw decomposition of the
    /// orientation quaternion.
    pub fn yaw(&self) -> f32 {
        let (_roll, _pitch, yaw) = self.orientation.euler_angles();
        yaw
    }

    /// `false` if any component is NaN or infinite. Externally supplied
    /// samples are screened with this before they replace a stored value.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite())
    }
}

/// The sole per-tick output: a linear velocity and a yaw rate.
///
/// `Default` is the explicit zero command emitted in `Idle` and on touchdown.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct VelocityCommand {
    pub linear: Vector3<f32>,
    pub yaw_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f32::consts::FRAC_PI_2;

    #[test]
    fn yaw_from_quaternion() {
        let pose = Pose::new(
            Vector3::zeros(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2),
        );
        assert_abs_diff_eq!(pose.yaw(), FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn default_command_is_zero() {
        let command = VelocityCommand::default();
        assert_eq!(command.linear, Vector3::zeros());
        assert_eq!(command.yaw_rate, 0.0);
    }

    #[test]
    fn non_finite_pose_is_rejected() {
        let mut pose = Pose::default();
        assert!(pose.is_finite());

        pose.position.x = f32::NAN;
        assert!(!pose.is_finite());

        pose.position.x = f32::INFINITY;
        assert!(!pose.is_finite());
    }
}
