// Fixed-rate control loop with watchdog
// The watchdog zeroes the drive when commands stop arriving, so a crashed
// teleop or planner never leaves the robot driving on its last command

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::time::interval;
use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use crate::config::{
    SwerveConfig, CMD_TIMEOUT, MODULE_NAMES, TOPIC_CMD_BASE, TOPIC_CMD_RESET_ODOMETRY,
    TOPIC_HEALTH, TOPIC_SENSOR_HEADING, TOPIC_STATE_MODULES, TOPIC_STATE_POSE,
};
use crate::messages::{
    BaseCommand, DriveTelemetry, HeadingSample, PoseEstimate, ResetOdometry, RuntimeHealth,
};
use crate::motor::actuator::{DriveActuator, HeadingSensor, SteeringActuator};
use crate::motor::{open_feetech_drive, open_sim_drive};
use crate::swerve::{Angle, ChassisVelocity, Periodic, Pose2d, SwerveDrive};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct Runtime {
    latest_cmd: Option<BaseCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: BaseCommand) {
        self.on_command_at(cmd, Instant::now());
    }

    fn on_command_at(&mut self, cmd: BaseCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Command to follow this tick, after the watchdog check
    pub fn compute_command(&mut self) -> BaseCommand {
        self.compute_command_at(Instant::now())
    }

    fn compute_command_at(&mut self, now: Instant) -> BaseCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        match &self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd.clone()
            }
            Some(_) => {
                // Watchdog triggered - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                BaseCommand::default()
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                BaseCommand::default()
            }
        }
    }

    /// Mark the current tick as failed at the hardware layer
    pub fn on_hardware_fault(&mut self) {
        self.health = RuntimeHealth::HardwareFault;
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }
}

/// Everything the binary decides before the loop starts
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run against simulated devices instead of the servo bus
    pub sim: bool,
    pub port: String,
    pub config: SwerveConfig,
    pub loop_hz: u64,
}

struct Endpoints<'a> {
    commands: Subscriber<FifoChannelHandler<Sample>>,
    resets: Subscriber<FifoChannelHandler<Sample>>,
    headings: Subscriber<FifoChannelHandler<Sample>>,
    pose: Publisher<'a>,
    modules: Publisher<'a>,
    health: Publisher<'a>,
}

pub async fn run(options: RunOptions) -> Result<(), BoxError> {
    if options.loop_hz == 0 {
        return Err("loop rate must be at least 1 Hz".into());
    }
    let period = Duration::from_secs_f64(1.0 / options.loop_hz as f64);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let endpoints = Endpoints {
        commands: session.declare_subscriber(TOPIC_CMD_BASE).await?,
        resets: session.declare_subscriber(TOPIC_CMD_RESET_ODOMETRY).await?,
        headings: session.declare_subscriber(TOPIC_SENSOR_HEADING).await?,
        pose: session.declare_publisher(TOPIC_STATE_POSE).await?,
        modules: session.declare_publisher(TOPIC_STATE_MODULES).await?,
        health: session.declare_publisher(TOPIC_HEALTH).await?,
    };

    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_BASE, TOPIC_CMD_RESET_ODOMETRY, TOPIC_SENSOR_HEADING
    );
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_STATE_POSE, TOPIC_STATE_MODULES, TOPIC_HEALTH
    );

    if options.sim {
        info!("Simulation mode: no hardware will be driven");
        let mut drive = open_sim_drive(&options.config)?;
        let dt = period.as_secs_f64();
        serve(&endpoints, &mut drive, period, |drive, _heading| {
            // Heading comes from the simulated gyro, integrated from the wheels
            let omega = drive.measured_chassis_velocity()?.omega;
            for module in drive.modules_mut() {
                module.drive_actuator_mut().step(dt);
            }
            drive.heading_sensor_mut().step(omega, dt);
            Ok(())
        })
        .await
    } else {
        let mut drive = open_feetech_drive(&options.port, &options.config)?;
        serve(&endpoints, &mut drive, period, |drive, heading| {
            if let Some(heading) = heading {
                drive.heading_sensor_mut().latch(heading);
            }
            Ok(())
        })
        .await
    }
}

/// Drive loop shared by every backend
///
/// `before_tick` runs first each tick with the newest heading sample, if any.
async fn serve<D, S, H>(
    endpoints: &Endpoints<'_>,
    drive: &mut SwerveDrive<D, S, H>,
    period: Duration,
    mut before_tick: impl FnMut(&mut SwerveDrive<D, S, H>, Option<Angle>) -> crate::error::Result<()>,
) -> Result<(), BoxError>
where
    D: DriveActuator,
    S: SteeringActuator,
    H: HeadingSensor,
{
    let mut runtime = Runtime::new();
    let mut tick = interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {:.0}Hz loop, {}ms watchdog timeout",
        1.0 / period.as_secs_f64(),
        CMD_TIMEOUT.as_millis()
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping drive");
                break;
            }
        }

        // 1. Devices and sensors catch up
        let heading = drain::<HeadingSample>(&endpoints.headings, "heading sample")
            .last()
            .map(|sample| Angle::from_degrees(sample.heading_deg));
        let mut fault = before_tick(drive, heading).err();

        // 2. Drain all pending commands (non-blocking), keep latest
        for cmd in drain::<BaseCommand>(&endpoints.commands, "command") {
            runtime.on_command(cmd);
        }
        if let Some(reset) = drain::<ResetOdometry>(&endpoints.resets, "odometry reset").last() {
            if let Err(e) = drive.reset_odometry(Pose2d::from(reset)) {
                fault = Some(e);
            }
        }

        // 3. Compute command (includes watchdog logic), drive, then odometry
        let cmd = runtime.compute_command();
        let result = drive
            .drive(ChassisVelocity::from(&cmd), cmd.field_relative)
            .and_then(|_| drive.periodic());
        if let Err(e) = result {
            fault = Some(e);
        }

        if let Some(e) = fault {
            warn!("Hardware error: {}", e);
            runtime.on_hardware_fault();
        }

        // 4. Publish pose, module telemetry and health
        let pose = PoseEstimate::from(drive.pose());
        endpoints.pose.put(serde_json::to_string(&pose)?).await?;

        match read_telemetry(drive) {
            Ok(telemetry) => endpoints.modules.put(serde_json::to_string(&telemetry)?).await?,
            Err(e) => warn!("Failed to read module telemetry: {}", e),
        }

        let health_json = serde_json::to_string(&runtime.health())?;
        endpoints.health.put(health_json).await?;
    }

    if let Err(e) = drive.stop() {
        warn!("Failed to stop drive on shutdown: {}", e);
    }
    Ok(())
}

fn read_telemetry<D, S, H>(drive: &mut SwerveDrive<D, S, H>) -> crate::error::Result<DriveTelemetry>
where
    D: DriveActuator,
    S: SteeringActuator,
    H: HeadingSensor,
{
    let states = drive.module_states()?;
    let positions = drive.module_positions()?;
    Ok(DriveTelemetry::new(
        MODULE_NAMES,
        states,
        positions,
        drive.chassis_velocity(),
    ))
}

/// Take every queued sample on `subscriber`, dropping ones that fail to parse
fn drain<T: DeserializeOwned>(
    subscriber: &Subscriber<FifoChannelHandler<Sample>>,
    what: &str,
) -> Vec<T> {
    let mut messages = Vec::new();
    while let Ok(Some(sample)) = subscriber.try_recv() {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<T>(&payload) {
            Ok(message) => messages.push(message),
            Err(e) => warn!("Failed to parse {}: {}", what, e),
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(x_vel: f64) -> BaseCommand {
        BaseCommand {
            x_vel,
            y_vel: 0.0,
            theta_vel: 0.5,
            field_relative: true,
        }
    }

    #[test]
    fn test_stale_until_first_command() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.compute_command(), BaseCommand::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_passes_through() {
        let mut runtime = Runtime::new();
        let start = Instant::now();
        runtime.on_command_at(command(1.0), start);

        let cmd = runtime.compute_command_at(start + Duration::from_millis(100));
        assert_eq!(cmd, command(1.0));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_zeroes_stale_command() {
        let mut runtime = Runtime::new();
        let start = Instant::now();
        runtime.on_command_at(command(1.0), start);

        let cmd = runtime.compute_command_at(start + CMD_TIMEOUT + Duration::from_millis(1));
        assert_eq!(cmd, BaseCommand::default());
        assert!(!cmd.field_relative);
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);

        // A new command recovers
        let later = start + Duration::from_secs(1);
        runtime.on_command_at(command(0.2), later);
        assert_eq!(runtime.compute_command_at(later), command(0.2));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_hardware_fault_lasts_one_tick() {
        let mut runtime = Runtime::new();
        let start = Instant::now();
        runtime.on_command_at(command(1.0), start);
        runtime.compute_command_at(start);
        runtime.on_hardware_fault();
        assert_eq!(runtime.health(), RuntimeHealth::HardwareFault);

        runtime.compute_command_at(start + Duration::from_millis(20));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }
}
