//! Daemon - the main gateway service
//!
//! Wires the database, roster, and listeners together and runs until
//! interrupted.

use std::sync::Arc;

use crate::db::{self, DbPool, SqliteDeviceRepository};
use crate::listener::ListenerService;
use crate::roster::{Roster, RosterEvent};
use crate::{Config, Result};

/// The gateway daemon
pub struct Daemon {
    config: Config,
    db: DbPool,
    roster: Arc<Roster>,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the database
    /// cannot be initialized
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let db = db::init(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "database initialized");

        Ok(Self {
            config,
            db,
            roster: Arc::new(Roster::new()),
        })
    }

    /// The shared roster; the external surface subscribes here
    #[must_use]
    pub fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if a listener cannot start
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            serial = self.config.serial,
            ethernet = self.config.ethernet,
            eth_port = self.config.eth_port,
            external_port = self.config.port,
            "daemon running"
        );

        // Trace the outward event feed
        let mut events = self.roster.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    RosterEvent::Joined(snapshot) => {
                        tracing::debug!(device = %snapshot.id, kind = %snapshot.device_type, "joined");
                    }
                    RosterEvent::Updated(snapshot) => {
                        tracing::trace!(device = %snapshot.id, "updated");
                    }
                    RosterEvent::Left(id) => {
                        tracing::debug!(device = %id, "left");
                    }
                }
            }
        });

        let repository: Arc<dyn crate::db::DeviceRepository> =
            Arc::new(SqliteDeviceRepository::new(self.db.clone()));
        let listener = ListenerService::new(
            self.config.clone(),
            Arc::clone(&self.roster),
            Some(repository),
        );
        let _listeners = listener.spawn().await?;

        tokio::signal::ctrl_c().await?;

        tracing::info!(live_devices = self.roster.len(), "shutting down");
        Ok(())
    }
}
