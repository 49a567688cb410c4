// Keyboard teleop: WASD move, Z/X rotate, R/F speed, V field-relative, O reset pose, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{SwerveConfig, TOPIC_CMD_BASE, TOPIC_CMD_RESET_ODOMETRY};
use swerve_zenoh_runtime::messages::{BaseCommand, ResetOdometry};

const SPEED_LEVELS: [f64; 3] = [0.25, 0.5, 1.0]; // fraction of full stick
const DEADBAND: f64 = 0.15;
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let cmd_publisher = session.declare_publisher(TOPIC_CMD_BASE).await?;
    let reset_publisher = session.declare_publisher(TOPIC_CMD_RESET_ODOMETRY).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, V=field-relative, O=reset pose, Q=quit");
    info!("Speed: LOW, robot-relative");

    enable_raw_mode()?;
    let result = run_teleop(&cmd_publisher, &reset_publisher).await;
    disable_raw_mode()?;

    result
}

/// Zero inside the deadband, rescaled so output still reaches ±1 at full stick
fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if value.abs() < deadband {
        0.0
    } else {
        value.signum() * (value.abs() - deadband) / (1.0 - deadband)
    }
}

async fn run_teleop(
    cmd_publisher: &zenoh::pubsub::Publisher<'_>,
    reset_publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let limits = SwerveConfig::default();
    let mut speed_idx: usize = 0;
    let mut field_relative = false;

    // Stick positions in [-1, 1]
    let mut x_axis = 0.0;
    let mut y_axis = 0.0;
    let mut theta_axis = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let level = SPEED_LEVELS[speed_idx];

                match code {
                    // Movement - update axis and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        x_axis = level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        x_axis = -level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        y_axis = level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        y_axis = -level;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        theta_axis = level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        theta_axis = -level;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEED_LEVELS.len() - 1);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('v') if pressed => {
                        field_relative = !field_relative;
                        info!("Field-relative: {}", field_relative);
                    }
                    KeyCode::Char('o') if pressed => {
                        let reset = ResetOdometry {
                            x: 0.0,
                            y: 0.0,
                            heading_deg: 0.0,
                        };
                        reset_publisher.put(serde_json::to_string(&reset)?).await?;
                        info!("Pose reset to origin");
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release the stick if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x_axis = 0.0;
            y_axis = 0.0;
            theta_axis = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = BaseCommand {
            x_vel: apply_deadband(x_axis, DEADBAND) * limits.max_speed,
            y_vel: apply_deadband(y_axis, DEADBAND) * limits.max_speed,
            theta_vel: apply_deadband(theta_axis, DEADBAND) * limits.max_angular_velocity,
            field_relative,
        };
        cmd_publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
