// Swerve drive runtime: module control, kinematics and odometry for a
// four-module swerve base, driven from a 50 Hz zenoh loop.

pub mod config;
pub mod error;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod swerve;

pub use error::SwerveError;
