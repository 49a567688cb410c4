// Swerve inverse and forward kinematics for a four-module chassis
//
// Inverse: chassis velocity -> per-module (speed, angle).
// Forward: per-module velocities (or distance deltas) -> chassis velocity
// (or twist), solved by least squares since four modules over-determine the
// three chassis degrees of freedom.

use super::angle::Angle;
use super::state::{
    ChassisVelocity, ModulePosition, ModuleState, Translation2d, Twist2d, MODULE_COUNT,
};
use crate::error::{Result, SwerveError};

/// Below this the least-squares system is treated as singular
const SINGULAR_EPSILON: f64 = 1e-12;

type Matrix3 = [[f64; 3]; 3];

/// Kinematic model of a four-module swerve chassis
///
/// Module offsets are measured from the chassis center, x forward and y left.
/// The same module order must be used for states, positions and geometry.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    modules: [Translation2d; MODULE_COUNT],
    last_headings: [Angle; MODULE_COUNT],
    /// Inverse of the forward-kinematics normal matrix (AᵀA)⁻¹
    normal_inverse: Matrix3,
}

impl SwerveKinematics {
    /// Build the model, rejecting offsets that cannot describe a real chassis
    pub fn new(modules: [Translation2d; MODULE_COUNT]) -> Result<Self> {
        for (i, offset) in modules.iter().enumerate() {
            if !offset.x.is_finite() || !offset.y.is_finite() {
                return Err(SwerveError::InvalidGeometry(format!(
                    "module {i} offset is not finite: ({}, {})",
                    offset.x, offset.y
                )));
            }
            if offset.norm() == 0.0 {
                return Err(SwerveError::InvalidGeometry(format!(
                    "module {i} sits at the chassis center"
                )));
            }
            if let Some(j) = modules[..i].iter().position(|other| other == offset) {
                return Err(SwerveError::InvalidGeometry(format!(
                    "modules {j} and {i} share the offset ({}, {})",
                    offset.x, offset.y
                )));
            }
        }

        let normal_inverse = invert(normal_matrix(&modules)).ok_or_else(|| {
            SwerveError::InvalidGeometry("module offsets do not constrain rotation".to_string())
        })?;

        Ok(Self {
            modules,
            last_headings: [Angle::ZERO; MODULE_COUNT],
            normal_inverse,
        })
    }

    pub fn modules(&self) -> &[Translation2d; MODULE_COUNT] {
        &self.modules
    }

    /// Inverse kinematics: the (speed, angle) each module needs for `velocity`
    ///
    /// Each module's velocity is the chassis translation plus ω × offset. A
    /// request of exactly zero keeps every module at its previous angle so the
    /// wheels don't snap back to 0° when the robot stops.
    pub fn to_module_states(&mut self, velocity: ChassisVelocity) -> [ModuleState; MODULE_COUNT] {
        if velocity.is_zero() {
            return self.last_headings.map(|angle| ModuleState::new(0.0, angle));
        }

        let states = self.modules.map(|offset| {
            let module_velocity = Translation2d::new(
                velocity.vx - velocity.omega * offset.y,
                velocity.vy + velocity.omega * offset.x,
            );
            ModuleState::new(module_velocity.norm(), module_velocity.angle())
        });

        self.last_headings = states.map(|state| state.angle);
        states
    }

    /// Scale every module speed down by one factor so none exceeds `max_speed`
    ///
    /// Ratios between modules (and so the path curvature) are preserved and
    /// angles are never touched.
    pub fn desaturate(
        states: [ModuleState; MODULE_COUNT],
        max_speed: f64,
    ) -> [ModuleState; MODULE_COUNT] {
        let largest = states
            .iter()
            .map(|state| state.speed.abs())
            .fold(0.0f64, f64::max);

        if largest > max_speed {
            states.map(|state| ModuleState::new(state.speed * max_speed / largest, state.angle))
        } else {
            states
        }
    }

    /// Forward kinematics: best-fit chassis velocity for measured module states
    pub fn to_chassis_velocity(&self, states: &[ModuleState; MODULE_COUNT]) -> ChassisVelocity {
        let vectors = states.map(|state| {
            Translation2d::new(state.speed * state.angle.cos(), state.speed * state.angle.sin())
        });
        let [vx, vy, omega] = self.solve(&vectors);
        ChassisVelocity::new(vx, vy, omega)
    }

    /// Forward kinematics on distance deltas between two position snapshots
    ///
    /// Each module's travel is taken along its angle in `end`.
    pub fn to_twist(
        &self,
        start: &[ModulePosition; MODULE_COUNT],
        end: &[ModulePosition; MODULE_COUNT],
    ) -> Twist2d {
        let mut deltas = [Translation2d::default(); MODULE_COUNT];
        for (delta, (start, end)) in deltas.iter_mut().zip(start.iter().zip(end.iter())) {
            let distance = end.distance - start.distance;
            *delta = Translation2d::new(distance * end.angle.cos(), distance * end.angle.sin());
        }

        let [dx, dy, dtheta] = self.solve(&deltas);
        Twist2d { dx, dy, dtheta }
    }

    /// Least-squares solve of A·[vx, vy, ω] = module vectors
    fn solve(&self, vectors: &[Translation2d; MODULE_COUNT]) -> [f64; 3] {
        // Aᵀb, with rows [1, 0, -y] and [0, 1, x] per module
        let mut rhs = [0.0; 3];
        for (offset, v) in self.modules.iter().zip(vectors.iter()) {
            rhs[0] += v.x;
            rhs[1] += v.y;
            rhs[2] += -offset.y * v.x + offset.x * v.y;
        }

        let m = &self.normal_inverse;
        [
            m[0][0] * rhs[0] + m[0][1] * rhs[1] + m[0][2] * rhs[2],
            m[1][0] * rhs[0] + m[1][1] * rhs[1] + m[1][2] * rhs[2],
            m[2][0] * rhs[0] + m[2][1] * rhs[1] + m[2][2] * rhs[2],
        ]
    }
}

/// AᵀA for the stacked per-module rows [1, 0, -y] and [0, 1, x]
fn normal_matrix(modules: &[Translation2d; MODULE_COUNT]) -> Matrix3 {
    let mut m = [[0.0; 3]; 3];
    for offset in modules {
        m[0][0] += 1.0;
        m[1][1] += 1.0;
        m[0][2] -= offset.y;
        m[1][2] += offset.x;
        m[2][2] += offset.x * offset.x + offset.y * offset.y;
    }
    m[2][0] = m[0][2];
    m[2][1] = m[1][2];
    m
}

fn invert(m: Matrix3) -> Option<Matrix3> {
    let cofactor = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
    };

    let c00 = cofactor(1, 2, 1, 2);
    let c01 = -cofactor(1, 2, 0, 2);
    let c02 = cofactor(1, 2, 0, 1);
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if det.abs() < SINGULAR_EPSILON {
        return None;
    }

    // Adjugate is the transposed cofactor matrix
    let adjugate = [
        [c00, -cofactor(0, 2, 1, 2), cofactor(0, 1, 1, 2)],
        [c01, cofactor(0, 2, 0, 2), -cofactor(0, 1, 0, 2)],
        [c02, -cofactor(0, 2, 0, 1), cofactor(0, 1, 0, 1)],
    ];
    Some(adjugate.map(|row| row.map(|value| value / det)))
}
