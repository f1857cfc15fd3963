// instec test application -- CLI tool for exercising the MK2000 driver
// against real hardware or the in-memory simulator.
//
// Usage:
//   instec-test-app --port /dev/ttyACM0 info
//   instec-test-app --host 192.168.1.50 status
//   instec-test-app --serial-number A1B2C3 hold 37
//   instec-test-app --simulate ramp 80 10
//   instec-test-app --simulate profile show 0
//   instec-test-app discover --window 3

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use instec::{Controller, ControllerBuilder, LoopNesting, PROFILE_COUNT, discovery, loop_nesting};
use instec_test_harness::SimulatedController;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// instec test application -- drives an MK2000 from the command line.
#[derive(Parser)]
#[command(name = "instec-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyACM0, COM3).
    #[arg(long, conflicts_with_all = ["host", "serial_number", "simulate"])]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = 38400)]
    baud: u32,

    /// Controller IP address for an Ethernet connection.
    #[arg(long, conflicts_with_all = ["serial_number", "simulate"])]
    host: Option<IpAddr>,

    /// Find the controller by serial number (serial ports first, then LAN).
    #[arg(long, conflicts_with = "simulate")]
    serial_number: Option<String>,

    /// Use the in-memory simulated controller instead of hardware.
    #[arg(long)]
    simulate: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print identification, ranges, and units.
    Info,

    /// Print one runtime-information snapshot.
    Status,

    /// Find controllers on serial ports and the LAN.
    /// Does not require --port, --host, or --serial-number.
    Discover {
        /// Seconds to listen for network replies.
        #[arg(long, default_value_t = 1)]
        window: u64,
    },

    /// Hold at a set point (°C).
    Hold {
        #[arg(allow_negative_numbers = true)]
        tsp: f64,
    },

    /// Ramp to a set point (°C) at a rate (°C/min).
    Ramp {
        #[arg(allow_negative_numbers = true)]
        tsp: f64,
        rate: f64,
    },

    /// Stop temperature control.
    Stop,

    /// Print stage, operation, ramp-rate, and power ranges.
    Range,

    /// Profile operations.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List all profile slots with their names and item counts.
    List,
    /// Print every item of a profile.
    Show { profile: u8 },
    /// Delete every item of a profile.
    Clear { profile: u8 },
    /// Start running a profile.
    Start { profile: u8 },
    /// Pause the running profile.
    Pause,
    /// Resume a paused profile.
    Resume,
    /// Stop the running profile.
    Stop,
}

// ---------------------------------------------------------------------------
// Connection setup
// ---------------------------------------------------------------------------

async fn create_controller(cli: &Cli) -> Result<Controller> {
    if cli.simulate {
        let controller = ControllerBuilder::new()
            .build_with_transport(Box::new(SimulatedController::new()))
            .await
            .context("failed to build simulated controller")?;
        println!("Connected (simulator)");
        return Ok(controller);
    }

    let mut builder = ControllerBuilder::new().baud_rate(cli.baud);
    if let Some(port) = &cli.port {
        builder = builder.serial_port(port);
    } else if let Some(host) = cli.host {
        builder = builder.network_address(host);
    } else if let Some(serial) = &cli.serial_number {
        builder = builder.serial_number(serial);
    } else {
        bail!("one of --port, --host, --serial-number, or --simulate is required");
    }

    let controller = builder.build().await.context("failed to configure controller")?;
    controller
        .connect()
        .await
        .context("failed to connect to controller")?;

    match controller.connection() {
        Some(connection) => println!("Connected to {connection}"),
        None => println!("Connected"),
    }
    Ok(controller)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_info(c: &Controller) -> Result<()> {
    let info = c.system_information().await?;
    let precision = c.precision().await?;

    println!("Controller Information");
    println!("  Company:        {}", info.company);
    println!("  Model:          {}", info.model);
    println!("  Serial:         {}", info.serial);
    println!("  Firmware:       {}", info.firmware);
    println!();
    println!("Configuration");
    println!("  Slaves:         {}", c.slave_count().await?);
    println!("  Operating:      {}", c.operating_slave().await?);
    println!("  PV unit:        {}", c.pv_unit_type().await?);
    println!("  MV unit:        {}", c.mv_unit_type().await?);
    println!(
        "  Precision:      PV {} / MV {} decimals",
        precision.pv_decimals, precision.mv_decimals
    );
    println!("  Mode:           {}", c.cooling_heating_status().await?);
    Ok(())
}

async fn cmd_status(c: &Controller) -> Result<()> {
    let s = c.runtime_information().await?;

    println!("Runtime Information");
    println!("  Slave:          {}", s.active_slave);
    println!("  PV:             {}", s.process_variable);
    println!("  MV:             {}", s.monitor_value);
    println!("  TSP:            {}", s.target_set_point);
    println!("  CSP:            {}", s.current_set_point);
    println!("  Ramp rate:      {} °C/min", s.ramp_rate);
    println!("  Power:          {}", s.percent_power);
    println!("  System status:  {}", s.system_status);
    println!(
        "  Profile:        {} (slot {}, item {})",
        s.profile_status, s.active_profile, s.instruction_index
    );
    println!("  Error code:     {}", s.error_code);
    Ok(())
}

async fn cmd_discover(window_secs: u64, baud: u32) -> Result<()> {
    println!("Probing serial ports...");
    let serial = discovery::discover_serial(baud).await;

    println!("Probing the LAN ({window_secs} s)...");
    let network = discovery::discover_network(Duration::from_secs(window_secs))
        .await
        .context("network discovery failed")?;
    println!();

    if serial.is_empty() && network.is_empty() {
        println!("No controllers found.");
        return Ok(());
    }

    println!("{:<14}  {:<16}  {:<10}  Location", "Serial", "Model", "Link");
    println!(
        "{:<14}  {:<16}  {:<10}  {}",
        "-".repeat(14),
        "-".repeat(16),
        "-".repeat(10),
        "-".repeat(16),
    );
    for c in &serial {
        println!("{:<14}  {:<16}  {:<10}  {}", c.serial, c.model, "serial", c.port);
    }
    for c in &network {
        println!("{:<14}  {:<16}  {:<10}  {}", c.serial, c.model, "ethernet", c.address);
    }

    println!();
    println!("{} controller(s) found.", serial.len() + network.len());
    Ok(())
}

async fn cmd_range(c: &Controller) -> Result<()> {
    let stage = c.stage_range().await?;
    let operation = c.operation_range().await?;
    let default = c.default_operation_range().await?;
    let rates = c.ramp_rate_range().await?;
    let power = c.power_range().await?;

    println!("Ranges");
    println!("  Stage:          {stage} °C");
    println!("  Operation:      {operation} °C");
    println!("  Default:        {default} °C");
    println!(
        "  Ramp rate:      [{}, {}] °C/min (above {} °C: [{}, {}])",
        rates.min, rates.max, rates.limit_value, rates.limit_min, rates.limit_max
    );
    println!("  Power:          [{}, {}]", power.min, power.max);
    Ok(())
}

async fn cmd_profile_list(c: &Controller) -> Result<()> {
    println!("{:<4}  {:<14}  Items", "Slot", "Name");
    println!("{:<4}  {:<14}  {}", "-".repeat(4), "-".repeat(14), "-".repeat(5));
    for profile in 0..PROFILE_COUNT {
        let name = c.profile_name(profile).await?;
        let count = c.item_count(profile).await?;
        println!("{profile:<4}  {name:<14}  {count}");
    }
    Ok(())
}

async fn cmd_profile_show(c: &Controller, profile: u8) -> Result<()> {
    let name = c.profile_name(profile).await?;
    let items = c.read_profile(profile).await?;

    println!("Profile {profile}: {name}");
    if items.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    for (index, item) in items.iter().enumerate() {
        println!("  {index:>3}  {item}");
    }
    match loop_nesting(&items) {
        LoopNesting::Balanced => {}
        LoopNesting::Unclosed(depth) => println!("  warning: {depth} loop(s) left open"),
        LoopNesting::UnmatchedEnd(index) => {
            println!("  warning: LOOP_END at {index} has no matching LOOP_BEGIN")
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // The `discover` command does not need a connection.
    if let Command::Discover { window } = &cli.command {
        return cmd_discover(*window, cli.baud).await;
    }

    let controller = create_controller(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&controller).await,
        Command::Status => cmd_status(&controller).await,
        Command::Hold { tsp } => controller
            .hold(*tsp)
            .await
            .with_context(|| format!("hold at {tsp} °C failed")),
        Command::Ramp { tsp, rate } => controller
            .ramp(*tsp, *rate)
            .await
            .with_context(|| format!("ramp to {tsp} °C at {rate} °C/min failed")),
        Command::Stop => controller.stop().await.context("stop failed"),
        Command::Range => cmd_range(&controller).await,
        Command::Profile { action } => match action {
            ProfileAction::List => cmd_profile_list(&controller).await,
            ProfileAction::Show { profile } => cmd_profile_show(&controller, *profile).await,
            ProfileAction::Clear { profile } => controller
                .delete_profile(*profile)
                .await
                .with_context(|| format!("clearing profile {profile} failed")),
            ProfileAction::Start { profile } => controller
                .start_profile(*profile)
                .await
                .with_context(|| format!("starting profile {profile} failed")),
            ProfileAction::Pause => controller.pause_profile().await.context("pause failed"),
            ProfileAction::Resume => controller.resume_profile().await.context("resume failed"),
            ProfileAction::Stop => controller.stop_profile().await.context("stop failed"),
        },
        // Handled before connecting.
        Command::Discover { .. } => Ok(()),
    };

    if let Err(e) = &result {
        if e.downcast_ref::<instec::Error>().is_some_and(instec::Error::is_validation) {
            eprintln!("Rejected: check the value against `instec-test-app range` and retry.");
        }
    }

    controller.disconnect().await.ok();
    result
}
