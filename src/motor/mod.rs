// Hardware layer for the swerve base
//
// Provides:
// - Actuator and sensor traits the swerve core drives
// - Simulated devices for running without hardware
// - Feetech STS3215 serial protocol implementation
// - Feetech-backed drive/steer actuators and drive assembly

pub mod actuator;
mod driver;
pub mod feetech;
pub mod heading;
pub mod sim;

pub use actuator::{AbsoluteEncoder, DriveActuator, HeadingSensor, SteeringActuator};
pub use driver::{
    feetech_drive_on, initialize_servos, open_feetech_drive, servo_speed_limit, FeetechDriveMotor,
    FeetechEncoder, FeetechSteerMotor, FeetechSwerveDrive, SharedBus, TurnCounter,
};
pub use feetech::{FeetechBus, FeetechError};
pub use heading::LatchedHeading;
pub use sim::{open_sim_drive, SimDriveMotor, SimEncoder, SimGyro, SimSteerMotor, SimSwerveDrive};
