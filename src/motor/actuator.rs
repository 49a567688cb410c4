// Hardware seams consumed by the swerve core.
//
// Each module owns one drive and one steering actuator; the chassis owns one
// heading sensor. Units on these traits are the device's native units
// (encoder counts and counts per velocity time base). Conversion to meters
// and degrees happens in SwerveModule.

use crate::error::Result;
use crate::swerve::Angle;

/// Velocity-controlled wheel motor.
pub trait DriveActuator {
    /// Command a wheel velocity in native units.
    fn set_velocity(&mut self, native: f64) -> Result<()>;

    /// Measured velocity in native units.
    fn velocity(&mut self) -> Result<f64>;

    /// Accumulated position in native counts, never wrapped.
    fn position(&mut self) -> Result<f64>;
}

/// Position-controlled steering motor.
///
/// Positions are continuous: the actuator accepts targets beyond one
/// revolution in either direction and reports them back the same way.
pub trait SteeringActuator {
    /// Command an absolute position in native counts.
    fn set_position(&mut self, native: f64) -> Result<()>;

    /// Measured position in native counts.
    fn position(&mut self) -> Result<f64>;

    /// Redefine the current physical position as `native` counts.
    fn seed_position(&mut self, native: f64) -> Result<()>;
}

/// Absolute module angle sensor, read once to seed the steering actuator.
pub trait AbsoluteEncoder {
    fn absolute_angle(&mut self) -> Result<Angle>;
}

/// Chassis heading source, trusted as ground truth each tick.
pub trait HeadingSensor {
    fn heading(&mut self) -> Result<Angle>;
}
