// Servo diagnostic: READ-ONLY check of the swerve servo bus
//
// This tool does NOT write anything to the servos. Run it before the runtime
// to confirm every drive and steering servo answers and to read the steering
// positions needed for encoder_offsets_deg.
//
// Usage: cargo run --example servo_diagnostic -- [port] [config.json]

use swerve_zenoh_runtime::config::{SwerveConfig, MODULE_NAMES, MOTOR_PORT};
use swerve_zenoh_runtime::motor::feetech::{FeetechBus, Register, POSITION_COUNTS};
use std::io::{self, Write};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| MOTOR_PORT.to_string());
    let config = match args.next() {
        Some(path) => SwerveConfig::load(path)?,
        None => SwerveConfig::default(),
    };

    println!("Swerve Servo Diagnostic (READ-ONLY)");
    println!("No writes, no movement.");
    println!();
    println!("Serial port: {}", port);
    println!("Drive IDs: {:?}", config.drive_ids);
    println!("Steer IDs: {:?}", config.steer_ids);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match FeetechBus::open(&port) {
        Ok(bus) => {
            println!("  ✓ Serial port opened");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!("  - Check the port path and USB cable");
            println!("  - On Linux, check the user is in the dialout group");
            return Err(e.into());
        }
    };
    println!();

    // (module, role, id) for all eight servos
    let servos: Vec<(&str, &str, u8)> = MODULE_NAMES
        .iter()
        .enumerate()
        .flat_map(|(i, &name)| {
            [
                (name, "drive", config.drive_ids[i]),
                (name, "steer", config.steer_ids[i]),
            ]
        })
        .collect();

    println!("Step 2: Pinging servos...");
    let mut missing = 0;
    for &(name, role, id) in &servos {
        print!("  {:<12} {:<5} (ID {}): ", name, role, id);
        io::stdout().flush()?;
        match bus.ping(id) {
            Ok(true) => println!("✓ RESPONDING"),
            Ok(false) => {
                println!("✗ NO RESPONSE");
                missing += 1;
            }
            Err(e) => {
                println!("✗ ERROR: {}", e);
                missing += 1;
            }
        }
    }
    println!();

    if missing > 0 {
        println!("⚠ {} servo(s) did not respond; check power, wiring and IDs", missing);
        println!();
    }

    println!("Step 3: Reading registers...");
    println!();
    for &(name, role, id) in &servos {
        println!("  === {} {} (ID {}) ===", name, role, id);

        match bus.read_u8(id, Register::OperatingMode) {
            Ok(mode) => {
                let mode_str = match mode {
                    0 => "Position",
                    1 => "Velocity",
                    2 => "PWM",
                    3 => "Step",
                    _ => "Unknown",
                };
                let expected = if role == "drive" { 1 } else { 3 };
                let marker = if mode == expected { "" } else { "  ⚠ runtime will reconfigure" };
                println!("    Operating Mode:   {} ({}){}", mode, mode_str, marker);
            }
            Err(e) => println!("    Operating Mode:   ERROR - {}", e),
        }

        match bus.read_u8(id, Register::TorqueEnable) {
            Ok(val) => println!("    Torque Enable:    {}", val),
            Err(e) => println!("    Torque Enable:    ERROR - {}", e),
        }

        match bus.get_velocity(id) {
            Ok(vel) => println!("    Present Velocity: {} (raw)", vel),
            Err(e) => println!("    Present Velocity: ERROR - {}", e),
        }

        match bus.get_position(id) {
            Ok(pos) => {
                let degrees = f64::from(pos) * 360.0 / f64::from(POSITION_COUNTS);
                println!("    Present Position: {} ({:.1}°)", pos, degrees);
            }
            Err(e) => println!("    Present Position: ERROR - {}", e),
        }
        println!();
    }

    println!("Diagnostic complete.");
    println!("With every wheel pointing straight ahead, copy the steer positions");
    println!("(degrees) into encoder_offsets_deg in the drive config.");

    Ok(())
}
