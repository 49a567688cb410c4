// Dead-reckoned pose estimate from wheel travel and a trusted heading sensor

use super::angle::Angle;
use super::kinematics::SwerveKinematics;
use super::state::{ModulePosition, Pose2d, MODULE_COUNT};

/// Running field-frame pose estimate
///
/// Translation is integrated from module distance deltas; rotation always
/// comes from the heading sensor, offset so that it matches the last pose the
/// estimate was reset to.
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    pose: Pose2d,
    heading_offset: Angle,
    previous_heading: Angle,
    previous_positions: [ModulePosition; MODULE_COUNT],
}

impl SwerveOdometry {
    pub fn new(
        kinematics: SwerveKinematics,
        heading: Angle,
        positions: [ModulePosition; MODULE_COUNT],
        initial_pose: Pose2d,
    ) -> Self {
        Self {
            kinematics,
            pose: initial_pose,
            heading_offset: initial_pose.heading - heading,
            previous_heading: initial_pose.heading,
            previous_positions: positions,
        }
    }

    /// Integrate the motion since the previous call and return the new pose
    pub fn update(&mut self, heading: Angle, positions: [ModulePosition; MODULE_COUNT]) -> Pose2d {
        let heading = heading + self.heading_offset;

        let mut twist = self.kinematics.to_twist(&self.previous_positions, &positions);
        twist.dtheta = self.previous_heading.shortest_delta(heading).as_radians();

        let next = self.pose.exp(twist);
        self.pose = Pose2d::new(next.x, next.y, heading);
        self.previous_heading = heading;
        self.previous_positions = positions;

        self.pose
    }

    /// Replace the pose and re-baseline heading and wheel positions
    ///
    /// The next [`update`](Self::update) measures deltas from `positions`, so
    /// the reset never produces a jump.
    pub fn reset_position(
        &mut self,
        heading: Angle,
        positions: [ModulePosition; MODULE_COUNT],
        pose: Pose2d,
    ) {
        self.pose = pose;
        self.heading_offset = pose.heading - heading;
        self.previous_heading = pose.heading;
        self.previous_positions = positions;
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }
}
