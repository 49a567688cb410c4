// Simulated devices for running the stack without hardware.
//
// Steering follows its command instantly; drive motors integrate their
// commanded velocity when the scheduler calls SimDriveMotor::step; the
// gyro integrates a yaw rate on SimGyro::step.

use crate::config::{SwerveConfig, MODULE_NAMES};
use crate::error::Result;
use crate::swerve::{Angle, SwerveDrive, SwerveModule, MODULE_COUNT};

use super::actuator::{AbsoluteEncoder, DriveActuator, HeadingSensor, SteeringActuator};

/// Drive assembled from simulated devices
pub type SimSwerveDrive = SwerveDrive<SimDriveMotor, SimSteerMotor, SimGyro>;

/// Simulated velocity-controlled drive motor
#[derive(Debug, Clone)]
pub struct SimDriveMotor {
    velocity: f64,
    position: f64,
    velocity_time_base: f64,
}

impl SimDriveMotor {
    /// `velocity_time_base` is the window (s) native velocity is expressed over
    pub fn new(velocity_time_base: f64) -> Self {
        Self {
            velocity: 0.0,
            position: 0.0,
            velocity_time_base,
        }
    }

    /// Advance the wheel by `dt` seconds at the commanded velocity
    pub fn step(&mut self, dt: f64) {
        self.position += self.velocity * dt / self.velocity_time_base;
    }

    /// Last commanded velocity, native units
    pub fn commanded_velocity(&self) -> f64 {
        self.velocity
    }
}

impl DriveActuator for SimDriveMotor {
    fn set_velocity(&mut self, native: f64) -> Result<()> {
        self.velocity = native;
        Ok(())
    }

    fn velocity(&mut self) -> Result<f64> {
        Ok(self.velocity)
    }

    fn position(&mut self) -> Result<f64> {
        Ok(self.position)
    }
}

/// Simulated steering motor that reaches its target instantly
#[derive(Debug, Clone, Default)]
pub struct SimSteerMotor {
    position: f64,
    commands: usize,
}

impl SimSteerMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of position commands received
    pub fn command_count(&self) -> usize {
        self.commands
    }
}

impl SteeringActuator for SimSteerMotor {
    fn set_position(&mut self, native: f64) -> Result<()> {
        self.position = native;
        self.commands += 1;
        Ok(())
    }

    fn position(&mut self) -> Result<f64> {
        Ok(self.position)
    }

    fn seed_position(&mut self, native: f64) -> Result<()> {
        self.position = native;
        Ok(())
    }
}

/// Absolute encoder reporting a fixed angle
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEncoder {
    angle: Angle,
}

impl SimEncoder {
    pub fn new(angle: Angle) -> Self {
        Self { angle }
    }
}

impl AbsoluteEncoder for SimEncoder {
    fn absolute_angle(&mut self) -> Result<Angle> {
        Ok(self.angle)
    }
}

/// Simulated gyro integrating yaw rate
#[derive(Debug, Clone, Copy, Default)]
pub struct SimGyro {
    heading: Angle,
}

impl SimGyro {
    pub fn new(heading: Angle) -> Self {
        Self { heading }
    }

    /// Integrate `omega` (rad/s) over `dt` seconds
    pub fn step(&mut self, omega: f64, dt: f64) {
        self.heading = self.heading + Angle::from_radians(omega * dt);
    }

    pub fn set_heading(&mut self, heading: Angle) {
        self.heading = heading;
    }
}

impl HeadingSensor for SimGyro {
    fn heading(&mut self) -> Result<Angle> {
        Ok(self.heading)
    }
}

/// Build a simulated drive from the same configuration the hardware uses
///
/// Every module starts pointing straight ahead and the gyro reads 0°.
pub fn open_sim_drive(config: &SwerveConfig) -> Result<SimSwerveDrive> {
    config.validate()?;
    let constants = config.module_constants();

    let module = |i: usize| {
        SwerveModule::new(
            MODULE_NAMES[i],
            constants,
            SimDriveMotor::new(constants.velocity_time_base),
            SimSteerMotor::new(),
            &mut SimEncoder::default(),
        )
    };
    let modules: [_; MODULE_COUNT] = [module(0)?, module(1)?, module(2)?, module(3)?];

    SwerveDrive::new(modules, config.geometry(), SimGyro::default(), config.max_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_integrates_velocity() {
        // Velocity expressed per 100 ms
        let mut motor = SimDriveMotor::new(0.1);
        motor.set_velocity(10.0).unwrap();
        motor.step(0.5);
        assert!((motor.position().unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(motor.commanded_velocity(), 10.0);
    }

    #[test]
    fn test_steer_tracks_command() {
        let mut steer = SimSteerMotor::new();
        steer.seed_position(100.0).unwrap();
        assert_eq!(steer.position().unwrap(), 100.0);
        steer.set_position(-250.0).unwrap();
        assert_eq!(steer.position().unwrap(), -250.0);
        assert_eq!(steer.command_count(), 1);
    }

    #[test]
    fn test_sim_drive_from_default_config() {
        let mut drive = open_sim_drive(&SwerveConfig::default()).unwrap();
        let names: Vec<String> = drive.modules_mut().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, MODULE_NAMES);
        assert_eq!(drive.max_speed(), SwerveConfig::default().max_speed);
    }

    #[test]
    fn test_gyro_integrates_yaw_rate() {
        let mut gyro = SimGyro::default();
        gyro.step(std::f64::consts::PI, 0.5);
        assert!((gyro.heading().unwrap().as_degrees() - 90.0).abs() < 1e-9);
    }
}
