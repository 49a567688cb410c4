// Closed-loop control of one swerve module
//
// Turns a desired (speed, angle) into a native drive velocity command and a
// native steering position command, and projects actuator readback back into
// meters and degrees.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::angle::{shortest_delta_degrees, Angle};
use super::state::{ModulePosition, ModuleState};
use crate::error::{ensure_positive, Result};
use crate::motor::actuator::{AbsoluteEncoder, DriveActuator, SteeringActuator};

/// Largest steering move before the wheel is reversed instead
const MAX_STEER_DEG: f64 = 90.0;
const HALF_TURN_DEG: f64 = 180.0;

/// Physical constants of one module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleConstants {
    /// Wheel diameter in meters
    pub wheel_diameter: f64,
    /// Drive motor turns per wheel turn
    pub drive_gear_ratio: f64,
    /// Steering motor turns per module turn
    pub steer_gear_ratio: f64,
    /// Drive encoder counts per motor revolution
    pub drive_counts_per_rev: f64,
    /// Steering encoder counts per motor revolution
    pub steer_counts_per_rev: f64,
    /// Window (s) a native velocity is measured over, e.g. 0.1 for "counts per 100 ms"
    pub velocity_time_base: f64,
}

impl ModuleConstants {
    /// Check every constant is finite and positive
    pub fn validate(&self) -> Result<()> {
        ensure_positive("wheel_diameter", self.wheel_diameter)?;
        ensure_positive("drive_gear_ratio", self.drive_gear_ratio)?;
        ensure_positive("steer_gear_ratio", self.steer_gear_ratio)?;
        ensure_positive("drive_counts_per_rev", self.drive_counts_per_rev)?;
        ensure_positive("steer_counts_per_rev", self.steer_counts_per_rev)?;
        ensure_positive("velocity_time_base", self.velocity_time_base)?;
        Ok(())
    }

    pub fn wheel_circumference(&self) -> f64 {
        self.wheel_diameter * PI
    }

    /// Drive encoder counts per meter of wheel travel
    pub fn drive_counts_per_meter(&self) -> f64 {
        self.drive_counts_per_rev * self.drive_gear_ratio / self.wheel_circumference()
    }

    /// Steering encoder counts per degree of module rotation
    pub fn steer_counts_per_degree(&self) -> f64 {
        self.steer_counts_per_rev * self.steer_gear_ratio / 360.0
    }
}

/// Equivalent target that never needs more than 90° of steering
///
/// When the shortest rotation from `current` to `desired.angle` is strictly
/// greater than 90°, the wheel is pointed the opposite way (angle + 180°,
/// wrapped into (-180°, 180°]) and driven backwards. A delta of exactly 90° is
/// left alone; a delta of exactly 180° flips.
pub fn optimize(desired: ModuleState, current: Angle) -> ModuleState {
    let delta = shortest_delta_degrees(current.as_degrees(), desired.angle.as_degrees());
    if delta.abs() > MAX_STEER_DEG {
        ModuleState::new(
            -desired.speed,
            (desired.angle + Angle::from_degrees(HALF_TURN_DEG)).wrapped(),
        )
    } else {
        desired
    }
}

/// One wheel-and-steering pair
pub struct SwerveModule<D, S> {
    name: String,
    constants: ModuleConstants,
    drive: D,
    steer: S,
}

impl<D: DriveActuator, S: SteeringActuator> SwerveModule<D, S> {
    /// Validate constants and seed the steering reference from `encoder`
    pub fn new(
        name: impl Into<String>,
        constants: ModuleConstants,
        drive: D,
        steer: S,
        encoder: &mut impl AbsoluteEncoder,
    ) -> Result<Self> {
        constants.validate()?;

        let mut module = Self {
            name: name.into(),
            constants,
            drive,
            steer,
        };
        module.reset_steering(encoder)?;
        Ok(module)
    }

    /// Re-seed the steering actuator so its position matches the absolute angle
    pub fn reset_steering(&mut self, encoder: &mut impl AbsoluteEncoder) -> Result<()> {
        let absolute = encoder.absolute_angle()?;
        let native = absolute.as_degrees() * self.constants.steer_counts_per_degree();
        info!(
            "Module {}: seeding steering at {:.1}° ({:.0} counts)",
            self.name,
            absolute.as_degrees(),
            native
        );
        self.steer.seed_position(native)
    }

    /// Drive toward `desired`, returning the optimized state actually commanded
    pub fn set_desired_state(&mut self, desired: ModuleState) -> Result<ModuleState> {
        let steer_native = self.steer.position()?;
        let current = self.native_to_angle(steer_native);
        let state = optimize(desired, current);

        let velocity = state.speed
            * self.constants.drive_counts_per_meter()
            * self.constants.velocity_time_base;
        debug!(
            "Module {}: speed={:.3} m/s angle={:.1}° -> drive={:.1}",
            self.name,
            state.speed,
            state.angle.as_degrees(),
            velocity
        );
        self.drive.set_velocity(velocity)?;
        self.steer_from(steer_native, state.angle)?;

        Ok(state)
    }

    /// Steer to `target` along the shortest path, returning the native setpoint
    ///
    /// The magnitude of the shortest delta is added to (counter-clockwise) or
    /// subtracted from (clockwise) the measured position, so the steering
    /// actuator never sees a wrapped target.
    pub fn change_direction(&mut self, target: Angle) -> Result<f64> {
        let steer_native = self.steer.position()?;
        self.steer_from(steer_native, target)
    }

    fn steer_from(&mut self, steer_native: f64, target: Angle) -> Result<f64> {
        let current = self.native_to_angle(steer_native);
        let delta = shortest_delta_degrees(current.as_degrees(), target.as_degrees());
        let change = delta.abs() * self.constants.steer_counts_per_degree();

        let setpoint = if delta < 0.0 {
            steer_native - change
        } else {
            steer_native + change
        };

        self.steer.set_position(setpoint)?;
        Ok(setpoint)
    }

    /// Measured module angle (unwrapped)
    pub fn angle(&mut self) -> Result<Angle> {
        let native = self.steer.position()?;
        Ok(self.native_to_angle(native))
    }

    /// Measured wheel speed and module angle
    pub fn state(&mut self) -> Result<ModuleState> {
        let velocity = self.drive.velocity()?;
        let speed = velocity
            / self.constants.velocity_time_base
            / self.constants.drive_counts_per_meter();
        Ok(ModuleState::new(speed, self.angle()?))
    }

    /// Accumulated wheel travel and module angle
    pub fn position(&mut self) -> Result<ModulePosition> {
        let distance = self.drive.position()? / self.constants.drive_counts_per_meter();
        Ok(ModulePosition::new(distance, self.angle()?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constants(&self) -> &ModuleConstants {
        &self.constants
    }

    pub fn drive_actuator_mut(&mut self) -> &mut D {
        &mut self.drive
    }

    pub fn steering_actuator_mut(&mut self) -> &mut S {
        &mut self.steer
    }

    fn native_to_angle(&self, native: f64) -> Angle {
        Angle::from_degrees(native / self.constants.steer_counts_per_degree())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::{SimDriveMotor, SimEncoder, SimSteerMotor};
    use crate::SwerveError;

    /// Falcon-style constants: 2048 counts, velocity per 100 ms
    fn constants() -> ModuleConstants {
        ModuleConstants {
            wheel_diameter: 0.1,
            drive_gear_ratio: 27.0 / 4.0,
            steer_gear_ratio: 150.0 / 7.0,
            drive_counts_per_rev: 2048.0,
            steer_counts_per_rev: 2048.0,
            velocity_time_base: 0.1,
        }
    }

    fn module_at(degrees: f64) -> SwerveModule<SimDriveMotor, SimSteerMotor> {
        let mut encoder = SimEncoder::new(Angle::from_degrees(degrees));
        SwerveModule::new(
            "test",
            constants(),
            SimDriveMotor::new(0.1),
            SimSteerMotor::new(),
            &mut encoder,
        )
        .unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_optimize_flips_past_ninety() {
        let desired = ModuleState::new(2.0, Angle::from_degrees(170.0));
        let state = optimize(desired, Angle::ZERO);
        assert_close(state.speed, -2.0);
        assert_close(state.angle.as_degrees(), -10.0);
    }

    #[test]
    fn test_optimize_keeps_small_moves() {
        let desired = ModuleState::new(1.5, Angle::from_degrees(45.0));
        assert_eq!(optimize(desired, Angle::from_degrees(-30.0)), desired);
    }

    #[test]
    fn test_optimize_boundaries() {
        // Exactly 90° stays, exactly 180° flips
        let quarter = ModuleState::new(1.0, Angle::from_degrees(90.0));
        assert_eq!(optimize(quarter, Angle::ZERO), quarter);

        let half = optimize(ModuleState::new(1.0, Angle::from_degrees(180.0)), Angle::ZERO);
        assert_eq!(half.speed, -1.0);
        assert_eq!(half.angle.as_degrees(), 0.0);
    }

    #[test]
    fn test_optimize_never_exceeds_ninety() {
        let mut current = -720.0;
        while current <= 720.0 {
            let mut target = -720.0;
            while target <= 720.0 {
                let desired = ModuleState::new(1.0, Angle::from_degrees(target));
                let state = optimize(desired, Angle::from_degrees(current));
                let rotation = shortest_delta_degrees(current, state.angle.as_degrees());
                assert!(rotation.abs() <= 90.0 + 1e-9, "{current} -> {target}: {rotation}");

                // Same wheel velocity vector either way
                assert_close(state.speed * state.angle.cos(), desired.speed * desired.angle.cos());
                assert_close(state.speed * state.angle.sin(), desired.speed * desired.angle.sin());
                target += 15.0;
            }
            current += 15.0;
        }
    }

    #[test]
    fn test_new_seeds_steering_from_encoder() {
        let mut module = module_at(33.0);
        let counts_per_degree = constants().steer_counts_per_degree();
        assert_close(
            module.steering_actuator_mut().position().unwrap(),
            33.0 * counts_per_degree,
        );
        assert_close(module.angle().unwrap().as_degrees(), 33.0);
    }

    #[test]
    fn test_new_rejects_zero_gear_ratio() {
        let mut encoder = SimEncoder::default();
        let bad = ModuleConstants {
            steer_gear_ratio: 0.0,
            ..constants()
        };
        let result = SwerveModule::new(
            "bad",
            bad,
            SimDriveMotor::new(0.1),
            SimSteerMotor::new(),
            &mut encoder,
        );
        assert!(matches!(
            result,
            Err(SwerveError::InvalidConstant {
                name: "steer_gear_ratio",
                ..
            })
        ));
    }

    #[test]
    fn test_set_desired_state_native_units() {
        let mut module = module_at(0.0);
        let state = module
            .set_desired_state(ModuleState::new(1.0, Angle::from_degrees(30.0)))
            .unwrap();
        assert_close(state.speed, 1.0);

        // 1 m/s -> counts per 100 ms
        let expected_velocity = 2048.0 * 6.75 / (0.1 * PI) * 0.1;
        assert_close(
            module.drive_actuator_mut().commanded_velocity(),
            expected_velocity,
        );
        assert_close(module.angle().unwrap().as_degrees(), 30.0);
        assert_close(module.state().unwrap().speed, 1.0);
    }

    #[test]
    fn test_set_desired_state_reverses_instead_of_long_turn() {
        let mut module = module_at(0.0);
        let state = module
            .set_desired_state(ModuleState::new(2.0, Angle::from_degrees(170.0)))
            .unwrap();
        assert_close(state.speed, -2.0);
        assert_close(module.angle().unwrap().as_degrees(), -10.0);
        assert!(module.drive_actuator_mut().commanded_velocity() < 0.0);
    }

    #[test]
    fn test_set_desired_state_is_idempotent() {
        let mut module = module_at(10.0);
        let desired = ModuleState::new(0.7, Angle::from_degrees(-60.0));

        module.set_desired_state(desired).unwrap();
        let first_steer = module.steering_actuator_mut().position().unwrap();
        let first_drive = module.drive_actuator_mut().commanded_velocity();

        module.set_desired_state(desired).unwrap();
        assert_close(module.steering_actuator_mut().position().unwrap(), first_steer);
        assert_close(module.drive_actuator_mut().commanded_velocity(), first_drive);
        assert_eq!(module.steering_actuator_mut().command_count(), 2);
    }

    #[test]
    fn test_change_direction_crosses_seam_continuously() {
        // Seeded at 350°, heading to 10° must move +20°, not -340°
        let mut module = module_at(350.0);
        let counts_per_degree = constants().steer_counts_per_degree();
        let setpoint = module.change_direction(Angle::from_degrees(10.0)).unwrap();
        assert_close(setpoint, 370.0 * counts_per_degree);

        // And back again from 370° (unwrapped) to -10° is -20°
        let setpoint = module.change_direction(Angle::from_degrees(-10.0)).unwrap();
        assert_close(setpoint, 350.0 * counts_per_degree);
    }

    #[test]
    fn test_change_direction_half_turn_is_deterministic() {
        let counts_per_degree = constants().steer_counts_per_degree();

        // A +180° and a -180° request both resolve to a positive half turn
        let mut module = module_at(0.0);
        let setpoint = module.change_direction(Angle::from_degrees(180.0)).unwrap();
        assert_close(setpoint, 180.0 * counts_per_degree);

        let mut module = module_at(0.0);
        let setpoint = module.change_direction(Angle::from_degrees(-180.0)).unwrap();
        assert_close(setpoint, 180.0 * counts_per_degree);

        // Through set_desired_state the half turn flips instead, so no steering at all
        let mut module = module_at(0.0);
        let state = module
            .set_desired_state(ModuleState::new(1.0, Angle::from_degrees(180.0)))
            .unwrap();
        assert_eq!(state.speed, -1.0);
        assert_close(module.steering_actuator_mut().position().unwrap(), 0.0);
    }

    #[test]
    fn test_position_reports_meters() {
        let mut module = module_at(0.0);
        module
            .set_desired_state(ModuleState::new(2.0, Angle::ZERO))
            .unwrap();
        module.drive_actuator_mut().step(0.5);
        let position = module.position().unwrap();
        assert_close(position.distance, 1.0);
        assert_close(position.angle.as_degrees(), 0.0);
    }
}
