use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use firmata_gateway::{Config, Daemon};

/// Firmata gateway - discovers and controls Firmata devices over TCP and serial
#[derive(Parser)]
#[command(name = "firmata-gateway", version, about)]
struct Cli {
    /// Disable the serial listener
    #[arg(long)]
    no_serial: bool,

    /// Disable the TCP (Ethernet) listener
    #[arg(long)]
    no_ethernet: bool,

    /// TCP port for the external (WebSocket) surface
    #[arg(long, env = "FGW_PORT", default_value = "8080")]
    port: u16,

    /// TCP port on which Firmata-over-TCP devices connect
    #[arg(long, env = "FGW_ETH_PORT", default_value = "3030")]
    eth_port: u16,

    /// Baud rate for scanned serial ports
    #[arg(long, env = "FGW_SERIAL_BAUD", default_value = "57600")]
    serial_baud: u32,

    /// Seconds between heartbeat probes
    #[arg(long, env = "FGW_HEARTBEAT", default_value = "3")]
    heartbeat_interval: u64,

    /// Path to the device database
    #[arg(long, env = "FGW_DATABASE", default_value = "firmata-gateway.db")]
    database: PathBuf,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List detected serial ports
    ListPorts,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "debug"
    } else {
        match cli.verbose {
            0 => "info,firmata_gateway=info",
            1 => "info,firmata_gateway=debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::ListPorts => list_ports(),
        };
    }

    let config = Config {
        serial: !cli.no_serial,
        ethernet: !cli.no_ethernet,
        port: cli.port,
        eth_port: cli.eth_port,
        serial_baud: cli.serial_baud,
        debug: cli.debug,
        database_path: cli.database,
        heartbeat_interval: Duration::from_secs(cli.heartbeat_interval),
    };

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

/// List detected serial ports with USB metadata
fn list_ports() -> anyhow::Result<()> {
    let ports = tokio_serial::available_ports()?;
    if ports.is_empty() {
        println!("no serial ports detected");
        return Ok(());
    }
    for port in ports {
        match port.port_type {
            tokio_serial::SerialPortType::UsbPort(info) => {
                println!(
                    "{}  usb {:04x}:{:04x}  {}",
                    port.port_name,
                    info.vid,
                    info.pid,
                    info.product.as_deref().unwrap_or("-"),
                );
            }
            other => println!("{}  {other:?}", port.port_name),
        }
    }
    Ok(())
}
