// Feetech-backed swerve hardware
//
// Wraps the shared servo bus as drive actuators (velocity mode), steering
// actuators (step mode) and absolute encoders, and assembles them into a
// SwerveDrive.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::actuator::{AbsoluteEncoder, DriveActuator, SteeringActuator};
use super::feetech::{self, FeetechBus, FeetechError, OperatingMode, Register, POSITION_COUNTS};
use super::heading::LatchedHeading;
use crate::config::{SwerveConfig, MODULE_NAMES};
use crate::error::{Result, SwerveError};
use crate::swerve::{Angle, ModuleConstants, SwerveDrive, SwerveModule, MODULE_COUNT};

/// One serial bus shared by all eight servos
pub type SharedBus = Arc<Mutex<FeetechBus>>;

/// Drive assembled from Feetech servos, heading fed from outside
pub type FeetechSwerveDrive = SwerveDrive<FeetechDriveMotor, FeetechSteerMotor, LatchedHeading>;

const COUNTS_PER_TURN: i64 = POSITION_COUNTS as i64;

fn with_bus<T>(
    bus: &SharedBus,
    f: impl FnOnce(&mut FeetechBus) -> feetech::Result<T>,
) -> Result<T> {
    let mut guard = bus.lock().map_err(|_| SwerveError::BusPoisoned)?;
    Ok(f(&mut guard)?)
}

/// Multi-turn count built from the servo's single-turn position register
///
/// Assumes the servo moves less than half a revolution between reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnCounter {
    last_raw: Option<u16>,
    turns: i64,
}

impl TurnCounter {
    pub fn unwrap(&mut self, raw: u16) -> f64 {
        let raw = raw % POSITION_COUNTS;
        if let Some(last) = self.last_raw {
            let step = i64::from(raw) - i64::from(last);
            if step > COUNTS_PER_TURN / 2 {
                self.turns -= 1;
            } else if step < -COUNTS_PER_TURN / 2 {
                self.turns += 1;
            }
        }
        self.last_raw = Some(raw);
        (self.turns * COUNTS_PER_TURN + i64::from(raw)) as f64
    }
}

/// Wheel servo in velocity mode; native velocity is steps per second
pub struct FeetechDriveMotor {
    bus: SharedBus,
    id: u8,
    turns: TurnCounter,
}

impl FeetechDriveMotor {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self {
            bus,
            id,
            turns: TurnCounter::default(),
        }
    }
}

impl DriveActuator for FeetechDriveMotor {
    fn set_velocity(&mut self, native: f64) -> Result<()> {
        let limit = f64::from(feetech::MAX_VELOCITY_RAW);
        if native.abs() > limit {
            warn!("Motor {}: velocity {:.0} clamped to ±{}", self.id, native, limit);
        }
        let raw = native.round().clamp(-limit, limit) as i16;
        with_bus(&self.bus, |bus| bus.set_velocity(self.id, raw))
    }

    fn velocity(&mut self) -> Result<f64> {
        with_bus(&self.bus, |bus| bus.get_velocity(self.id)).map(f64::from)
    }

    fn position(&mut self) -> Result<f64> {
        let raw = with_bus(&self.bus, |bus| bus.get_position(self.id))?;
        Ok(self.turns.unwrap(raw))
    }
}

impl Drop for FeetechDriveMotor {
    fn drop(&mut self) {
        // Try to stop the wheel when the driver goes away
        if let Err(e) = self.set_velocity(0.0) {
            warn!("Failed to stop motor {} on drop: {}", self.id, e);
        }
    }
}

/// Steering servo in step mode
///
/// Reports a continuous position: the unwrapped register plus an offset set by
/// [`seed_position`](SteeringActuator::seed_position). Targets go out as a
/// relative step from the present position, so a move across the 0/4095 seam
/// takes the short way.
pub struct FeetechSteerMotor {
    bus: SharedBus,
    id: u8,
    turns: TurnCounter,
    offset: f64,
}

impl FeetechSteerMotor {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self {
            bus,
            id,
            turns: TurnCounter::default(),
            offset: 0.0,
        }
    }

    fn raw_position(&mut self) -> Result<f64> {
        let raw = with_bus(&self.bus, |bus| bus.get_position(self.id))?;
        Ok(self.turns.unwrap(raw))
    }
}

impl SteeringActuator for FeetechSteerMotor {
    fn set_position(&mut self, native: f64) -> Result<()> {
        let present = self.position()?;
        let limit = f64::from(feetech::MAX_VELOCITY_RAW);
        let steps = (native - present).round().clamp(-limit, limit) as i16;
        debug!("Motor {}: step {} (native {:.1} -> {:.1})", self.id, steps, present, native);
        with_bus(&self.bus, |bus| bus.set_goal_step(self.id, steps))
    }

    fn position(&mut self) -> Result<f64> {
        Ok(self.raw_position()? + self.offset)
    }

    fn seed_position(&mut self, native: f64) -> Result<()> {
        self.offset = native - self.raw_position()?;
        Ok(())
    }
}

/// Steering servo read as an absolute module angle
///
/// Only absolute when the servo turns the module directly, which
/// [`feetech_drive_on`] enforces.
pub struct FeetechEncoder {
    bus: SharedBus,
    id: u8,
    offset: Angle,
}

impl FeetechEncoder {
    /// `offset` is the reading when the wheel points straight ahead
    pub fn new(bus: SharedBus, id: u8, offset: Angle) -> Self {
        Self { bus, id, offset }
    }
}

impl AbsoluteEncoder for FeetechEncoder {
    fn absolute_angle(&mut self) -> Result<Angle> {
        let raw = with_bus(&self.bus, |bus| bus.get_position(self.id))?;
        let degrees = f64::from(raw) * 360.0 / f64::from(POSITION_COUNTS);
        Ok((Angle::from_degrees(degrees) - self.offset).wrapped())
    }
}

/// Check every servo answers and put it in the right operating mode
///
/// Torque is disabled while the mode changes, then re-enabled.
pub fn initialize_servos(bus: &mut FeetechBus, config: &SwerveConfig) -> feetech::Result<()> {
    let all_ids = config.drive_ids.iter().chain(config.steer_ids.iter());

    for &id in all_ids.clone() {
        match bus.ping(id)? {
            true => debug!("Motor {} responding", id),
            false => {
                warn!("Motor {} not responding to ping", id);
                return Err(FeetechError::Timeout { id });
            }
        }
    }

    for &id in all_ids.clone() {
        bus.disable_torque(id)?;
    }
    for &id in &config.drive_ids {
        bus.set_operating_mode(id, OperatingMode::Velocity)?;
    }
    for &id in &config.steer_ids {
        bus.set_operating_mode(id, OperatingMode::Step)?;
    }
    // Wheels must not spin up on a stale goal once torque comes back
    let stopped: Vec<(u8, i16)> = config.drive_ids.iter().map(|&id| (id, 0)).collect();
    bus.sync_write_i16(Register::GoalVelocity, &stopped)?;
    for &id in all_ids {
        bus.enable_torque(id)?;
    }

    info!(
        "Servos initialized: drive {:?}, steer {:?}",
        config.drive_ids, config.steer_ids
    );
    Ok(())
}

/// Open the servo bus and build a swerve drive on it
pub fn open_feetech_drive(port: &str, config: &SwerveConfig) -> Result<FeetechSwerveDrive> {
    info!("Opening motor bus on {}", port);
    let mut bus = FeetechBus::open(port)?;
    initialize_servos(&mut bus, config)?;
    feetech_drive_on(Arc::new(Mutex::new(bus)), config)
}

/// Fastest wheel speed (m/s) the drive servo's velocity register can express
pub fn servo_speed_limit(constants: &ModuleConstants) -> f64 {
    f64::from(feetech::MAX_VELOCITY_RAW)
        / (constants.drive_counts_per_meter() * constants.velocity_time_base)
}

/// Configured max speed, capped so desaturation scales every wheel before
/// any single servo would clamp
fn hardware_max_speed(config: &SwerveConfig) -> f64 {
    let limit = servo_speed_limit(&config.module_constants());
    if config.max_speed > limit {
        warn!(
            "max_speed {:.3} m/s exceeds servo limit, capping at {:.3} m/s",
            config.max_speed, limit
        );
        limit
    } else {
        config.max_speed
    }
}

/// Build a swerve drive on an already-initialized bus
///
/// Steering servos must turn the module directly: their position register
/// doubles as the absolute module encoder.
pub fn feetech_drive_on(bus: SharedBus, config: &SwerveConfig) -> Result<FeetechSwerveDrive> {
    config.validate()?;
    if config.steer_gear_ratio != 1.0 {
        return Err(SwerveError::InvalidConstant {
            name: "steer_gear_ratio",
            value: config.steer_gear_ratio,
        });
    }

    let module = |i: usize| {
        let mut encoder = FeetechEncoder::new(
            bus.clone(),
            config.steer_ids[i],
            Angle::from_degrees(config.encoder_offsets_deg[i]),
        );
        SwerveModule::new(
            MODULE_NAMES[i],
            config.module_constants(),
            FeetechDriveMotor::new(bus.clone(), config.drive_ids[i]),
            FeetechSteerMotor::new(bus.clone(), config.steer_ids[i]),
            &mut encoder,
        )
    };
    let modules: [_; MODULE_COUNT] = [module(0)?, module(1)?, module(2)?, module(3)?];

    SwerveDrive::new(
        modules,
        config.geometry(),
        LatchedHeading::default(),
        hardware_max_speed(config),
    )
}
