use crate::nav::{Pose, VelocityCommand};

/// A frame resolution failure.
///
/// The localization stack is an external collaborator; a lookup can find no
/// transform at all or fail to produce one in time. Both are retryable once
/// the system is up, and the tick that hits one skips its command rather
/// than blocking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// No transform between the world and body frames is available yet.
    Unavailable,
    /// The lookup did not complete within its deadline.
    TimedOut,
}

/// Access to the vehicle's pose and to world-to-body frame resolution.
pub trait FrameResolver {
    /// The vehicle's current pose in the world frame.
    fn vehicle_pose(&mut self) -> Result<Pose, FrameError>;

    /// Express a world-frame pose in the vehicle body frame.
    fn to_body_frame(&mut self, target: &Pose) -> Result<Pose, FrameError>;
}

/// Output seam for the one velocity command emitted per tick.
pub trait CommandSink {
    fn publish(&mut self, command: VelocityCommand);
}
