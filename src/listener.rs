//! Listener service
//!
//! Produces links and hands each to a new device session. Two
//! sub-listeners, independently enabled by configuration: a TCP acceptor
//! for Firmata-over-Ethernet boards and a serial port scanner for
//! directly attached ones.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialPortType};

use crate::config::Config;
use crate::db::DeviceRepository;
use crate::device::{self, SessionSettings};
use crate::link::Link;
use crate::roster::Roster;
use crate::Result;

/// How often the serial scanner re-enumerates ports
const SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Serial port name fragments that are never Firmata boards
const IGNORED_PORTS: &[&str] = &["Bluetooth", "debug-console"];

/// Accepts new links and starts device sessions over them
pub struct ListenerService {
    config: Config,
    roster: Arc<Roster>,
    repository: Option<Arc<dyn DeviceRepository>>,
    settings: SessionSettings,
}

impl ListenerService {
    /// Create a listener service over a shared roster
    #[must_use]
    pub fn new(
        config: Config,
        roster: Arc<Roster>,
        repository: Option<Arc<dyn DeviceRepository>>,
    ) -> Self {
        let settings = SessionSettings {
            heartbeat_interval: config.heartbeat_interval,
            ..SessionSettings::default()
        };
        Self {
            config,
            roster,
            repository,
            settings,
        }
    }

    /// Spawn the enabled sub-listeners.
    ///
    /// # Errors
    ///
    /// Returns error if the TCP listener cannot bind its port
    pub async fn spawn(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut tasks = Vec::new();
        if self.config.ethernet {
            tasks.push(self.spawn_tcp().await?);
        }
        if self.config.serial {
            tasks.push(self.spawn_serial_scanner());
        }
        Ok(tasks)
    }

    /// Bind the TCP port and accept Firmata-over-TCP connections
    async fn spawn_tcp(&self) -> Result<JoinHandle<()>> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.eth_port)).await?;
        tracing::info!(port = self.config.eth_port, "ethernet listener started");

        let roster = Arc::clone(&self.roster);
        let repository = self.repository.clone();
        let settings = self.settings.clone();

        Ok(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::info!(peer = %peer, "device connected");
                        let link = Link::tcp(stream, peer);
                        let session = device::spawn(
                            link,
                            Arc::clone(&roster),
                            repository.clone(),
                            settings.clone(),
                        );
                        // Surface the connect outcome without blocking accepts
                        tokio::spawn(async move {
                            match session.await {
                                Ok(Ok(())) | Err(_) => {}
                                Ok(Err(e)) => {
                                    tracing::warn!(peer = %peer, error = %e, "session failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }))
    }

    /// Periodically enumerate serial ports and start sessions on new ones
    fn spawn_serial_scanner(&self) -> JoinHandle<()> {
        tracing::info!("serial scanner started");

        let roster = Arc::clone(&self.roster);
        let repository = self.repository.clone();
        let settings = self.settings.clone();
        let baud = self.config.serial_baud;
        let active: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        tokio::spawn(async move {
            let mut scan = tokio::time::interval(SCAN_INTERVAL);
            loop {
                scan.tick().await;
                let ports = match tokio_serial::available_ports() {
                    Ok(ports) => ports,
                    Err(e) => {
                        tracing::warn!(error = %e, "serial enumeration failed");
                        continue;
                    }
                };

                for port in ports {
                    let path = port.port_name.clone();
                    if IGNORED_PORTS.iter().any(|skip| path.contains(skip)) {
                        continue;
                    }
                    {
                        let mut held = active.lock().expect("scanner lock poisoned");
                        if !held.insert(path.clone()) {
                            continue;
                        }
                    }

                    let usb_info = match &port.port_type {
                        SerialPortType::UsbPort(info) => Some((info.vid, info.pid)),
                        _ => None,
                    };

                    let stream = match tokio_serial::new(&path, baud).open_native_async() {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::debug!(port = %path, error = %e, "serial open failed");
                            active.lock().expect("scanner lock poisoned").remove(&path);
                            continue;
                        }
                    };

                    tracing::info!(port = %path, baud, "serial device attached");
                    let link = Link::serial(stream, &path, usb_info);
                    let session = device::spawn(
                        link,
                        Arc::clone(&roster),
                        repository.clone(),
                        settings.clone(),
                    );

                    // Release the port for rescan once the session ends,
                    // identification failures included.
                    let active = Arc::clone(&active);
                    tokio::spawn(async move {
                        match session.await {
                            Ok(Ok(())) | Err(_) => {}
                            Ok(Err(e)) => {
                                tracing::warn!(port = %path, error = %e, "session failed");
                            }
                        }
                        active.lock().expect("scanner lock poisoned").remove(&path);
                    });
                }
            }
        })
    }
}
