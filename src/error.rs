//! Error types for the Firmata gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Write attempted on a closed link
    #[error("link closed")]
    LinkClosed,

    /// Device did not reach READY within the identification deadline
    #[error("connection timeout: {0}")]
    ConnectionTimeout(String),

    /// Device did not answer a heartbeat within the reply deadline
    #[error("heartbeat timeout: {0}")]
    HeartbeatTimeout(String),

    /// Action name not present in the device's action table
    #[error("action unavailable: {0}")]
    ActionUnavailable(String),

    /// Action parameters missing, unparseable, or out of range
    #[error("action malformed: {0}")]
    ActionMalformed(String),

    /// Malformed Firmata frame (logged and discarded by the decoder)
    #[error("codec error: {0}")]
    Codec(String),

    /// No live session for the requested device identity
    #[error("device not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serial port error
    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error leaves the session usable.
    ///
    /// Command-surface errors are surfaced to the caller without touching
    /// the session; everything else terminates it.
    #[must_use]
    pub fn is_command_error(&self) -> bool {
        matches!(self, Self::ActionUnavailable(_) | Self::ActionMalformed(_))
    }
}
