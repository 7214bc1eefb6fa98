//! Firmata Gateway - device gateway for Firmata boards over TCP and serial
//!
//! The gateway discovers boards, identifies their firmware, keeps a live
//! roster of sessions, and exposes a typed command surface to higher
//! layers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Transports                        │
//! │        TCP listener     │     serial scanner         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Link
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Device sessions                      │
//! │  codec │ identify │ sample │ heartbeat │ actions     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ snapshots / joined / left
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Roster                           │
//! │   execute_action  │  snapshot()  │  subscribe()      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod db;
pub mod device;
pub mod error;
pub mod firmata;
pub mod link;
pub mod listener;
pub mod roster;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool, DeviceRecord, DeviceRepository, SqliteDeviceRepository};
pub use device::{
    ActionTable, DeviceHandle, DeviceSnapshot, Pin, PinSnapshot, Pinout, SessionSettings, Variant,
};
pub use error::{Error, Result};
pub use firmata::{Decoder, FirmataEvent, PinMode};
pub use link::{Link, LinkReader, LinkWriter};
pub use listener::ListenerService;
pub use roster::{Roster, RosterEvent};
