//! Configuration for the Firmata gateway

use std::path::PathBuf;
use std::time::Duration;

/// Default TCP port on which Firmata-over-TCP devices connect
pub const DEFAULT_ETH_PORT: u16 = 3030;

/// Default TCP port for the external (WebSocket) surface
pub const DEFAULT_EXTERNAL_PORT: u16 = 8080;

/// Default baud rate for directly attached Firmata boards
pub const DEFAULT_SERIAL_BAUD: u32 = 57_600;

/// Default heartbeat probe interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Gateway configuration
///
/// Built from the CLI in `main`; the daemon consumes nothing else.
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable the serial listener (port scanner)
    pub serial: bool,

    /// Enable the TCP (Ethernet) listener
    pub ethernet: bool,

    /// TCP port for the external (WebSocket) surface.
    /// Consumed by the UI layer that subscribes to the roster feed.
    pub port: u16,

    /// TCP port on which Firmata-over-TCP devices connect
    pub eth_port: u16,

    /// Baud rate used when opening scanned serial ports
    pub serial_baud: u32,

    /// Verbose logging
    pub debug: bool,

    /// Path to the device database
    pub database_path: PathBuf,

    /// Interval between heartbeat probes on live sessions
    pub heartbeat_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: true,
            ethernet: true,
            port: DEFAULT_EXTERNAL_PORT,
            eth_port: DEFAULT_ETH_PORT,
            serial_baud: DEFAULT_SERIAL_BAUD,
            debug: false,
            database_path: PathBuf::from("firmata-gateway.db"),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl Config {
    /// Validate listener configuration
    ///
    /// # Errors
    ///
    /// Returns error if both listeners are disabled
    pub fn validate(&self) -> crate::Result<()> {
        if !self.serial && !self.ethernet {
            return Err(crate::Error::Config(
                "at least one of serial or ethernet must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}
