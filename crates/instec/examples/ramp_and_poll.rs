//! Ramp to a set point and poll until the controller gets there.
//!
//! The driver does not wait for a ramp to settle; this example shows the
//! polling loop a caller writes instead. Pass a serial number to locate the
//! controller, or nothing to run against the built-in simulator.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p instec --example ramp_and_poll -- A1B2C3
//! cargo run -p instec --example ramp_and_poll
//! ```

use std::time::Duration;

use instec::{ControllerBuilder, SystemStatus};
use instec_test_harness::SimulatedController;

const TARGET: f64 = 60.0;
const RATE: f64 = 20.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let controller = match std::env::args().nth(1) {
        Some(serial) => {
            println!("Locating controller {serial}...");
            let c = ControllerBuilder::new().serial_number(&serial).build().await?;
            c.connect().await?;
            c
        }
        None => {
            println!("No serial number given, using the simulator.");
            ControllerBuilder::new()
                .build_with_transport(Box::new(SimulatedController::new()))
                .await?
        }
    };

    let range = controller.operation_range().await?;
    println!("Operation range: {range} °C");

    controller.ramp(TARGET, RATE).await?;
    println!("Ramping to {TARGET} °C at {} °C/min", controller.ramp_rate().await?);

    for _ in 0..30 {
        let s = controller.runtime_information().await?;
        println!(
            "  PV {:>8.3}  CSP {:>8.3}  status {}",
            s.process_variable, s.current_set_point, s.system_status
        );
        if s.system_status != SystemStatus::Ramp || (s.process_variable - TARGET).abs() < 0.1 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    controller.stop().await?;
    controller.disconnect().await?;
    Ok(())
}
