// Timeouts, topics, drive configuration
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ensure_positive, SwerveError};
use crate::swerve::{ModuleConstants, SwerveKinematics, Translation2d, MODULE_COUNT};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "swerve/cmd/base"; // drive commands
pub const TOPIC_CMD_RESET_ODOMETRY: &str = "swerve/cmd/reset_odometry"; // pose resets
pub const TOPIC_SENSOR_HEADING: &str = "swerve/sensor/heading"; // IMU heading in
pub const TOPIC_STATE_POSE: &str = "swerve/state/pose"; // pose estimate
pub const TOPIC_STATE_MODULES: &str = "swerve/state/modules"; // per-module telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Serial port for the Feetech servo bus
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Module order used everywhere: geometry, servo IDs, telemetry
pub const MODULE_NAMES: [&str; MODULE_COUNT] =
    ["left_front", "left_rear", "right_front", "right_rear"];

/// Failure to load a drive configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] SwerveError),
}

/// Physical description of the base
///
/// Loaded from JSON; any field left out takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwerveConfig {
    /// Wheel diameter in meters
    pub wheel_diameter: f64,
    /// Drive motor turns per wheel turn
    pub drive_gear_ratio: f64,
    /// Steering motor turns per module turn
    pub steer_gear_ratio: f64,
    pub drive_counts_per_rev: f64,
    pub steer_counts_per_rev: f64,
    /// Window (s) native velocities are expressed over
    pub velocity_time_base: f64,
    /// Max wheel speed, m/s
    pub max_speed: f64,
    /// Max chassis rotation rate, rad/s
    pub max_angular_velocity: f64,
    /// Module offsets from the chassis center (x forward, y left), meters
    pub module_offsets: [[f64; 2]; MODULE_COUNT],
    pub drive_ids: [u8; MODULE_COUNT],
    pub steer_ids: [u8; MODULE_COUNT],
    /// Steering servo reading (degrees) when each wheel points straight ahead
    pub encoder_offsets_deg: [f64; MODULE_COUNT],
}

impl Default for SwerveConfig {
    fn default() -> Self {
        // 0.304 m per axis puts each module 0.43 m from the center
        const HALF_TRACK: f64 = 0.304;
        Self {
            wheel_diameter: 0.1,
            drive_gear_ratio: 27.0 / 4.0,
            // Feetech steering servos turn the module directly
            steer_gear_ratio: 1.0,
            drive_counts_per_rev: 4096.0,
            steer_counts_per_rev: 4096.0,
            velocity_time_base: 1.0,
            max_speed: 3.658,
            max_angular_velocity: 10.472,
            module_offsets: [
                [HALF_TRACK, HALF_TRACK],
                [-HALF_TRACK, HALF_TRACK],
                [HALF_TRACK, -HALF_TRACK],
                [-HALF_TRACK, -HALF_TRACK],
            ],
            drive_ids: [0, 1, 2, 3],
            steer_ids: [4, 5, 6, 7],
            encoder_offsets_deg: [0.0; MODULE_COUNT],
        }
    }
}

impl SwerveConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Loaded drive config from {}", path.display());
        Ok(config)
    }

    /// Check constants, geometry and servo IDs
    pub fn validate(&self) -> crate::error::Result<()> {
        self.module_constants().validate()?;
        ensure_positive("max_speed", self.max_speed)?;
        ensure_positive("max_angular_velocity", self.max_angular_velocity)?;
        SwerveKinematics::new(self.geometry())?;

        for offset in self.encoder_offsets_deg {
            if !offset.is_finite() {
                return Err(SwerveError::InvalidConstant {
                    name: "encoder_offsets_deg",
                    value: offset,
                });
            }
        }

        let ids: Vec<u8> = self.drive_ids.iter().chain(&self.steer_ids).copied().collect();
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(SwerveError::DuplicateServoId(*id));
            }
        }
        Ok(())
    }

    pub fn module_constants(&self) -> ModuleConstants {
        ModuleConstants {
            wheel_diameter: self.wheel_diameter,
            drive_gear_ratio: self.drive_gear_ratio,
            steer_gear_ratio: self.steer_gear_ratio,
            drive_counts_per_rev: self.drive_counts_per_rev,
            steer_counts_per_rev: self.steer_counts_per_rev,
            velocity_time_base: self.velocity_time_base,
        }
    }

    pub fn geometry(&self) -> [Translation2d; MODULE_COUNT] {
        self.module_offsets.map(|[x, y]| Translation2d::new(x, y))
    }

    /// Distance from the chassis center to the farthest module, meters
    pub fn drive_base_radius(&self) -> f64 {
        self.geometry()
            .iter()
            .map(Translation2d::norm)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SwerveConfig::default();
        config.validate().unwrap();
        assert!((config.drive_base_radius() - 0.43).abs() < 0.001);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SwerveConfig =
            serde_json::from_str(r#"{ "max_speed": 2.0, "steer_ids": [10, 11, 12, 13] }"#).unwrap();
        assert_eq!(config.max_speed, 2.0);
        assert_eq!(config.steer_ids, [10, 11, 12, 13]);
        assert_eq!(config.drive_ids, SwerveConfig::default().drive_ids);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_duplicate_servo_ids() {
        let config = SwerveConfig {
            steer_ids: [4, 5, 6, 3],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SwerveError::DuplicateServoId(3))
        ));
    }

    #[test]
    fn test_rejects_bad_constants_and_geometry() {
        let config = SwerveConfig {
            wheel_diameter: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SwerveError::InvalidConstant { name: "wheel_diameter", .. })
        ));

        let mut config = SwerveConfig::default();
        config.module_offsets[1] = config.module_offsets[0];
        assert!(matches!(
            config.validate(),
            Err(SwerveError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = SwerveConfig::load("/nonexistent/swerve.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_round_trips_file() {
        let path = std::env::temp_dir().join(format!("swerve-config-{}.json", std::process::id()));
        let config = SwerveConfig {
            max_speed: 1.5,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = SwerveConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
