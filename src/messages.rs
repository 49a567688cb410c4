// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::swerve::{Angle, ChassisVelocity, ModulePosition, ModuleState, Pose2d, MODULE_COUNT};

// Command from teleop/scripts -> runtime
// Velocities in m/s and rad/s; robot-relative unless field_relative is set
// Default is the zero command the watchdog falls back to
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BaseCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
    #[serde(default)]
    pub field_relative: bool,
}

impl From<&BaseCommand> for ChassisVelocity {
    fn from(cmd: &BaseCommand) -> Self {
        ChassisVelocity::new(cmd.x_vel, cmd.y_vel, cmd.theta_vel)
    }
}

/// Overwrite the pose estimate (e.g. at the start of an autonomous path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetOdometry {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub heading_deg: f64,
}

impl From<&ResetOdometry> for Pose2d {
    fn from(reset: &ResetOdometry) -> Self {
        Pose2d::new(reset.x, reset.y, Angle::from_degrees(reset.heading_deg))
    }
}

/// Heading sample from the IMU node
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeadingSample {
    pub heading_deg: f64,
}

/// One module's measured state, published each tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTelemetry {
    pub name: String,
    pub speed: f64,
    pub angle_deg: f64,
    pub distance: f64,
}

impl ModuleTelemetry {
    pub fn new(name: &str, state: ModuleState, position: ModulePosition) -> Self {
        Self {
            name: name.to_string(),
            speed: state.speed,
            angle_deg: state.angle.as_degrees(),
            distance: position.distance,
        }
    }
}

/// Pose estimate published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoseEstimate {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

impl From<Pose2d> for PoseEstimate {
    fn from(pose: Pose2d) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            heading_deg: pose.heading.as_degrees(),
        }
    }
}

/// Module telemetry plus the velocity the drive is following
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveTelemetry {
    pub modules: Vec<ModuleTelemetry>,
    pub commanded: ChassisVelocity,
}

impl DriveTelemetry {
    pub fn new(
        names: [&str; MODULE_COUNT],
        states: [ModuleState; MODULE_COUNT],
        positions: [ModulePosition; MODULE_COUNT],
        commanded: ChassisVelocity,
    ) -> Self {
        let modules = (0..MODULE_COUNT)
            .map(|i| ModuleTelemetry::new(names[i], states[i], positions[i]))
            .collect();
        Self { modules, commanded }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    HardwareFault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_command_defaults_to_robot_relative() {
        let cmd: BaseCommand =
            serde_json::from_str(r#"{"x_vel": 0.5, "y_vel": -0.25, "theta_vel": 1.0}"#).unwrap();
        assert!(!cmd.field_relative);
        assert_eq!(ChassisVelocity::from(&cmd), ChassisVelocity::new(0.5, -0.25, 1.0));
    }

    #[test]
    fn test_reset_odometry_to_pose() {
        let reset: ResetOdometry = serde_json::from_str(r#"{"x": 1.0, "y": 2.0}"#).unwrap();
        let pose = Pose2d::from(&reset);
        assert_eq!((pose.x, pose.y), (1.0, 2.0));
        assert_eq!(pose.heading, Angle::ZERO);
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::HardwareFault).unwrap(),
            "\"hardware_fault\""
        );
    }

    #[test]
    fn test_telemetry_lists_modules_in_order() {
        let names = ["a", "b", "c", "d"];
        let states = [ModuleState::new(1.0, Angle::from_degrees(45.0)); MODULE_COUNT];
        let positions = [ModulePosition::new(2.0, Angle::from_degrees(45.0)); MODULE_COUNT];
        let telemetry = DriveTelemetry::new(names, states, positions, ChassisVelocity::zero());

        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["modules"][2]["name"], "c");
        assert_eq!(json["modules"][0]["angle_deg"], 45.0);
        assert_eq!(json["modules"][3]["distance"], 2.0);
    }
}
