// Chassis-level swerve drive.
//
// SwerveDrive owns the four modules, the kinematic model, the odometry
// estimate and the heading sensor. Commands flow through SwerveDrive::drive;
// the pose estimate advances once per Periodic::periodic call. Both are
// expected to be called from the same control loop, one after the other.

use tracing::{debug, info};

use super::angle::Angle;
use super::kinematics::SwerveKinematics;
use super::module::SwerveModule;
use super::odometry::SwerveOdometry;
use super::state::{ChassisVelocity, ModulePosition, ModuleState, Pose2d, Translation2d, MODULE_COUNT};
use crate::error::{ensure_positive, Result};
use crate::motor::actuator::{DriveActuator, HeadingSensor, SteeringActuator};

/// Work a scheduler runs once per control-loop tick.
pub trait Periodic {
    fn periodic(&mut self) -> Result<()>;
}

/// Hooks an autonomous path follower needs from a holonomic drivetrain.
pub trait HolonomicTarget {
    /// Current field-frame pose estimate.
    fn current_pose(&self) -> Pose2d;

    /// Overwrite the pose estimate, e.g. with a path's starting pose.
    fn reset_pose(&mut self, pose: Pose2d) -> Result<()>;

    /// Most recently commanded chassis velocity.
    fn robot_relative_velocity(&self) -> ChassisVelocity;

    /// Follow a robot-relative chassis velocity.
    fn drive_robot_relative(&mut self, velocity: ChassisVelocity) -> Result<()>;
}

/// Four swerve modules plus heading sensor, kinematics and odometry.
///
/// Modules are ordered left-front, left-rear, right-front, right-rear, and the
/// geometry passed to [`SwerveDrive::new`] must use the same order.
pub struct SwerveDrive<D, S, H> {
    modules: [SwerveModule<D, S>; MODULE_COUNT],
    kinematics: SwerveKinematics,
    odometry: SwerveOdometry,
    heading_sensor: H,
    max_speed: f64,
    commanded: ChassisVelocity,
}

impl<D, S, H> SwerveDrive<D, S, H>
where
    D: DriveActuator,
    S: SteeringActuator,
    H: HeadingSensor,
{
    /// Assemble the drive and start odometry at the origin.
    ///
    /// # Errors
    ///
    /// Fails on invalid geometry, a non-positive `max_speed`, or if the initial
    /// sensor readback fails.
    pub fn new(
        mut modules: [SwerveModule<D, S>; MODULE_COUNT],
        geometry: [Translation2d; MODULE_COUNT],
        mut heading_sensor: H,
        max_speed: f64,
    ) -> Result<Self> {
        let max_speed = ensure_positive("max_speed", max_speed)?;
        let kinematics = SwerveKinematics::new(geometry)?;

        let heading = heading_sensor.heading()?;
        let positions = read_positions(&mut modules)?;
        let odometry =
            SwerveOdometry::new(kinematics.clone(), heading, positions, Pose2d::default());

        info!(
            "Swerve drive ready: max speed {:.2} m/s, heading {:.1}°",
            max_speed,
            heading.as_degrees()
        );

        Ok(Self {
            modules,
            kinematics,
            odometry,
            heading_sensor,
            max_speed,
            commanded: ChassisVelocity::zero(),
        })
    }

    /// Drive at `velocity`, given in the field frame when `field_relative`.
    ///
    /// The request is remembered as given (see [`chassis_velocity`](Self::chassis_velocity)).
    pub fn drive(&mut self, velocity: ChassisVelocity, field_relative: bool) -> Result<()> {
        let robot_relative = if field_relative {
            velocity.from_field_relative(self.heading_sensor.heading()?)
        } else {
            velocity
        };

        let states = self.kinematics.to_module_states(robot_relative);
        let states = SwerveKinematics::desaturate(states, self.max_speed);
        self.commanded = velocity;

        debug!(
            "Drive vx={:.3} vy={:.3} omega={:.3} field_relative={}",
            velocity.vx, velocity.vy, velocity.omega, field_relative
        );
        self.apply(states)
    }

    /// Command module states directly, desaturated to the drive's max speed.
    pub fn set_module_states(&mut self, states: [ModuleState; MODULE_COUNT]) -> Result<()> {
        self.apply(SwerveKinematics::desaturate(states, self.max_speed))
    }

    /// Zero velocity; modules hold their last angle.
    pub fn stop(&mut self) -> Result<()> {
        self.drive(ChassisVelocity::zero(), false)
    }

    fn apply(&mut self, states: [ModuleState; MODULE_COUNT]) -> Result<()> {
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_desired_state(state)?;
        }
        Ok(())
    }

    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// Replace the pose estimate, re-baselining against the current readings.
    pub fn reset_odometry(&mut self, pose: Pose2d) -> Result<()> {
        let heading = self.heading_sensor.heading()?;
        let positions = self.module_positions()?;
        self.odometry.reset_position(heading, positions, pose);
        info!(
            "Odometry reset to ({:.3}, {:.3}, {:.1}°)",
            pose.x,
            pose.y,
            pose.heading.as_degrees()
        );
        Ok(())
    }

    /// Last commanded velocity, in whatever frame it was requested.
    pub fn chassis_velocity(&self) -> ChassisVelocity {
        self.commanded
    }

    /// Robot-relative velocity reconstructed from measured module states.
    pub fn measured_chassis_velocity(&mut self) -> Result<ChassisVelocity> {
        let states = self.module_states()?;
        Ok(self.kinematics.to_chassis_velocity(&states))
    }

    pub fn module_states(&mut self) -> Result<[ModuleState; MODULE_COUNT]> {
        let mut states = [ModuleState::default(); MODULE_COUNT];
        for (state, module) in states.iter_mut().zip(self.modules.iter_mut()) {
            *state = module.state()?;
        }
        Ok(states)
    }

    pub fn module_positions(&mut self) -> Result<[ModulePosition; MODULE_COUNT]> {
        read_positions(&mut self.modules)
    }

    pub fn heading(&mut self) -> Result<Angle> {
        self.heading_sensor.heading()
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn modules_mut(&mut self) -> &mut [SwerveModule<D, S>; MODULE_COUNT] {
        &mut self.modules
    }

    pub fn heading_sensor_mut(&mut self) -> &mut H {
        &mut self.heading_sensor
    }
}

fn read_positions<D: DriveActuator, S: SteeringActuator>(
    modules: &mut [SwerveModule<D, S>; MODULE_COUNT],
) -> Result<[ModulePosition; MODULE_COUNT]> {
    let mut positions = [ModulePosition::default(); MODULE_COUNT];
    for (position, module) in positions.iter_mut().zip(modules.iter_mut()) {
        *position = module.position()?;
    }
    Ok(positions)
}

impl<D, S, H> Periodic for SwerveDrive<D, S, H>
where
    D: DriveActuator,
    S: SteeringActuator,
    H: HeadingSensor,
{
    /// Advance odometry from the current heading and module positions.
    fn periodic(&mut self) -> Result<()> {
        let heading = self.heading_sensor.heading()?;
        let positions = self.module_positions()?;
        self.odometry.update(heading, positions);
        Ok(())
    }
}

impl<D, S, H> HolonomicTarget for SwerveDrive<D, S, H>
where
    D: DriveActuator,
    S: SteeringActuator,
    H: HeadingSensor,
{
    fn current_pose(&self) -> Pose2d {
        self.pose()
    }

    fn reset_pose(&mut self, pose: Pose2d) -> Result<()> {
        self.reset_odometry(pose)
    }

    fn robot_relative_velocity(&self) -> ChassisVelocity {
        self.chassis_velocity()
    }

    fn drive_robot_relative(&mut self, velocity: ChassisVelocity) -> Result<()> {
        self.drive(velocity, false)
    }
}
