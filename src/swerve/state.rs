// Plain data types shared by the kinematics, module and odometry code

use serde::{Deserialize, Serialize};

use super::angle::Angle;

/// Number of swerve modules on the chassis
pub const MODULE_COUNT: usize = 4;

/// Speed (m/s) and wheel angle of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: Angle,
}

impl ModuleState {
    pub const fn new(speed: f64, angle: Angle) -> Self {
        Self { speed, angle }
    }
}

/// Accumulated wheel travel (m) and wheel angle of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: Angle,
}

impl ModulePosition {
    pub const fn new(distance: f64, angle: Angle) -> Self {
        Self { distance, angle }
    }
}

/// Chassis velocity: translation in m/s, rotation in rad/s (counter-clockwise positive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisVelocity {
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }

    /// Convert a field-frame request into the robot frame given the robot heading
    pub fn from_field_relative(self, heading: Angle) -> Self {
        let translation = Translation2d::new(self.vx, self.vy).rotate_by(-heading);
        Self::new(translation.x, translation.y, self.omega)
    }

    /// Convert a robot-frame velocity into the field frame given the robot heading
    pub fn to_field_relative(self, heading: Angle) -> Self {
        let translation = Translation2d::new(self.vx, self.vy).rotate_by(heading);
        Self::new(translation.x, translation.y, self.omega)
    }
}

/// A 2D vector in meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn angle(&self) -> Angle {
        Angle::from_radians(self.y.atan2(self.x))
    }

    /// Rotate counter-clockwise by `angle`
    pub fn rotate_by(self, angle: Angle) -> Self {
        let (sin, cos) = angle.as_radians().sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

/// Incremental motion in the robot frame: dx, dy in meters, dtheta in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Robot pose in the field frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub heading: Angle,
}

impl Pose2d {
    pub const fn new(x: f64, y: f64, heading: Angle) -> Self {
        Self { x, y, heading }
    }

    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x, self.y)
    }

    /// Advance along a constant-curvature arc described by `twist`
    ///
    /// The twist is expressed in the frame of `self`; the returned heading is
    /// `self.heading + dtheta`.
    pub fn exp(&self, twist: Twist2d) -> Pose2d {
        let Twist2d { dx, dy, dtheta } = twist;
        let (sin_theta, cos_theta) = dtheta.sin_cos();

        // Series expansion near zero avoids dividing by a vanishing dtheta
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        let local = Translation2d::new(dx * s - dy * c, dx * c + dy * s);
        let field = local.rotate_by(self.heading);

        Pose2d::new(
            self.x + field.x,
            self.y + field.y,
            self.heading + Angle::from_radians(dtheta),
        )
    }
}
