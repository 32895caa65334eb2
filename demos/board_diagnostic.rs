// Board diagnostic: check the serial link and readiness handshake
//
// Only a READY frame is written unless --stop is given, in which case the
// neutral set-point is pushed once (wheels should stay still).
//
// Usage: cargo run --example board_diagnostic -- <robot_id> [port] [--stop]
// Example: cargo run --example board_diagnostic -- 1 /dev/ttyUSB0

use ugv_messenger::config::DEFAULT_PORT_PREFIX;
use ugv_messenger::motor::protocol::DEFAULT_BAUDRATE;
use ugv_messenger::motor::{find_port, ControllerSession, DifferentialDrive};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let send_stop = args.iter().any(|a| a == "--stop");
    let mut positional = args.iter().filter(|a| !a.starts_with("--"));

    let robot_id: u8 = match positional.next() {
        Some(id) => id.parse()?,
        None => {
            println!("Usage: board_diagnostic <robot_id> [port] [--stop]");
            return Ok(());
        }
    };
    let port = match positional.next() {
        Some(port) => port.clone(),
        None => find_port(DEFAULT_PORT_PREFIX)?,
    };

    println!("Serial port: {}", port);
    println!("Board ID:    {}", robot_id);
    println!("Baud rate:   {}", DEFAULT_BAUDRATE);
    println!();

    println!("Step 1: Opening serial port...");
    let mut session = match ControllerSession::open(&port, DEFAULT_BAUDRATE, robot_id) {
        Ok(session) => {
            println!("  ✓ Serial port opened successfully");
            session
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Check you are in the dialout group");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Readiness handshake...");
    if session.is_ready() {
        println!("  ✓ Board {} is ready", robot_id);
    } else {
        println!("  ✗ Board {} did not answer", robot_id);
        println!();
        println!("Troubleshooting:");
        println!("  - Check the robot ID matches the board's address");
        println!("  - Check the baud rate matches the board firmware");
        return Ok(());
    }
    println!();

    if send_stop {
        let neutral = DifferentialDrive::default().neutral();
        println!(
            "Step 3: Sending neutral set-point (R: {} L: {})...",
            neutral.right, neutral.left
        );
        session.send(neutral)?;
        println!("  ✓ Sent");
    }

    Ok(())
}
