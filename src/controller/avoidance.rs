//! Quadrant avoidance for large lateral errors during station-keeping.
//!
//! A bang-bang lateral law: the body-frame position error is augmented with
//! a nonlinear velocity term that penalizes fast closing rates, and the sign
//! pair of the augmented signal selects one of four fixed-magnitude diagonal
//! escape commands. Everything here is pure so all sign combinations and the
//! deadband boundary are directly testable.

use crate::fabs;
use nalgebra::Vector2;

/// Weight on the raw position error.
const POSITION_GAIN: f32 = 10.0;

/// Weight on the `v·|v|` braking term.
const BRAKE_GAIN: f32 = 1910.0;

/// Augmented-signal magnitude below which the vehicle coasts.
const DEADBAND: f32 = 0.2;

/// Magnitude of each component of the diagonal escape command.
const ESCAPE_SPEED: f32 = 10.0;

/// The velocity-augmented error signal for one lateral axis.
///
/// The `velocity * |velocity|` term acts as a crude predictive brake: it
/// grows quadratically with the closing rate and flips sign with it.
pub fn slide_signal(error: f32, velocity: f32) -> f32 {
    POSITION_GAIN * error + BRAKE_GAIN * velocity * fabs(velocity)
}

/// Select the lateral velocity command for an augmented signal pair.
///
/// Mixed pairs where neither component clears the deadband on its own fall
/// through to the coast branch.
pub fn quadrant_command(s_x: f32, s_y: f32) -> Vector2<f32> {
    if fabs(s_x) > DEADBAND || fabs(s_y) > DEADBAND {
        if s_x > DEADBAND && s_y > DEADBAND {
            log::debug!("avoidance quadrant 1");
            Vector2::new(-ESCAPE_SPEED, -ESCAPE_SPEED)
        } else if s_x < -DEADBAND && s_y > DEADBAND {
            log::debug!("avoidance quadrant 2");
            Vector2::new(ESCAPE_SPEED, -ESCAPE_SPEED)
        } else if s_x < -DEADBAND && s_y < -DEADBAND {
            log::debug!("avoidance quadrant 3");
            Vector2::new(ESCAPE_SPEED, ESCAPE_SPEED)
        } else if s_x > DEADBAND && s_y < -DEADBAND {
            log::debug!("avoidance quadrant 4");
            Vector2::new(-ESCAPE_SPEED, ESCAPE_SPEED)
        } else {
            Vector2::zeros()
        }
    } else {
        log::debug!("avoidance coast");
        Vector2::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn slide_signal_brakes_quadratically() {
        assert_abs_diff_eq!(slide_signal(1.0, 0.0), 10.0);
        assert_abs_diff_eq!(slide_signal(0.0, 0.1), 19.1, epsilon = 1e-4);
        assert_abs_diff_eq!(slide_signal(0.0, -0.1), -19.1, epsilon = 1e-4);
        assert_abs_diff_eq!(slide_signal(1.0, -0.1), -9.1, epsilon = 1e-4);
    }

    #[test]
    fn quadrant_signs_map_to_diagonals() {
        assert_eq!(quadrant_command(0.3, 0.3), Vector2::new(-10.0, -10.0));
        assert_eq!(quadrant_command(-0.3, 0.3), Vector2::new(10.0, -10.0));
        assert_eq!(quadrant_command(-0.3, -0.3), Vector2::new(10.0, 10.0));
        assert_eq!(quadrant_command(0.3, -0.3), Vector2::new(-10.0, 10.0));
    }

    #[test]
    fn small_signals_coast() {
        assert_eq!(quadrant_command(0.1, 0.1), Vector2::zeros());
        assert_eq!(quadrant_command(0.0, 0.0), Vector2::zeros());
    }

    #[test]
    fn deadband_boundary_coasts() {
        // |s| exactly at the deadband does not clear the strict comparison.
        assert_eq!(quadrant_command(0.2, 0.2), Vector2::zeros());
        assert_eq!(quadrant_command(-0.2, -0.2), Vector2::zeros());
    }

    #[test]
    fn mixed_pair_with_one_small_axis_coasts() {
        // One axis clears the deadband on its own but its partner sits inside
        // it, so no quadrant matches.
        assert_eq!(quadrant_command(0.5, 0.0), Vector2::zeros());
        assert_eq!(quadrant_command(0.0, -0.5), Vector2::zeros());
    }
}
