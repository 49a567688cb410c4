// Swerve drive core
//
// Provides:
// - Angle wrap-around math
// - Per-module speed/steering control with the 90° reversal optimization
// - Four-module inverse/forward kinematics and desaturation
// - Wheel + heading odometry
// - The chassis-level drive tying them together

pub mod angle;
mod drive;
pub mod kinematics;
pub mod module;
pub mod odometry;
pub mod state;

pub use angle::{shortest_delta_degrees, wrap_degrees, Angle};
pub use drive::{HolonomicTarget, Periodic, SwerveDrive};
pub use kinematics::SwerveKinematics;
pub use module::{optimize, ModuleConstants, SwerveModule};
pub use odometry::SwerveOdometry;
pub use state::{
    ChassisVelocity, ModulePosition, ModuleState, Pose2d, Translation2d, Twist2d, MODULE_COUNT,
};
