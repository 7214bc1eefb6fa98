//! Device model: pin state, variants, actions, and the session engine

pub mod actions;
pub mod session;
pub mod variant;

use serde::Serialize;

use crate::firmata::constants::NOT_ANALOG;
use crate::firmata::PinMode;

pub use actions::{ActionSpec, ActionTable};
pub use session::{spawn, DeviceHandle, SessionSettings};
pub use variant::Variant;

/// Host-side cache of one hardware pin
#[derive(Debug, Clone)]
pub struct Pin {
    /// Modes the board reports for this pin
    pub supported_modes: Vec<PinMode>,

    /// Analog channel number (127 = not analog)
    pub analog_channel: u8,

    /// Mode the gateway last set (None until first set)
    pub mode: Option<PinMode>,

    /// Last observed or written value
    pub value: u16,
}

impl Pin {
    /// Build a pin from a capability row
    #[must_use]
    pub fn from_capability(modes: &[(PinMode, u8)]) -> Self {
        Self {
            supported_modes: modes.iter().map(|(mode, _)| *mode).collect(),
            analog_channel: NOT_ANALOG,
            mode: None,
            value: 0,
        }
    }

    /// A usable digital pin: no analog channel, some supported mode,
    /// and ANALOG not among them
    #[must_use]
    pub fn is_digital(&self) -> bool {
        self.analog_channel == NOT_ANALOG
            && !self.supported_modes.is_empty()
            && !self.supported_modes.contains(&PinMode::Analog)
    }

    /// An analog-input pin
    #[must_use]
    pub fn is_analog(&self) -> bool {
        self.supported_modes.contains(&PinMode::Analog)
    }

    /// Whether the pin supports the given mode
    #[must_use]
    pub fn supports(&self, mode: PinMode) -> bool {
        self.supported_modes.contains(&mode)
    }
}

/// Conventional pins of a board architecture
#[derive(Debug, Clone, Copy)]
pub struct Pinout {
    /// Built-in LED pin
    pub led: u8,
    /// Serial receive pin
    pub rx: u8,
    /// Serial transmit pin
    pub tx: u8,
}

/// Conventional Arduino pin map
pub const ARDUINO_PINOUT: Pinout = Pinout {
    led: 13,
    rx: 0,
    tx: 1,
};

/// Projection of one pin for external consumers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinSnapshot {
    pub index: u8,
    pub supported_modes: Vec<PinMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PinMode>,
    pub value: u16,
    pub analog_channel: u8,
}

/// Value-typed projection of a session for external consumers.
///
/// Derived on demand; subscribers receive copies, never references into
/// session state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Stable link-derived identity
    pub id: String,

    /// Firmware name (`.ino` suffix stripped)
    pub name: String,

    /// Firmware version reported at identification, as `major.minor`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    /// USB vendor id, when the link knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,

    /// USB product id, when the link knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,

    /// Variant tag ("Generic", "LedController", "MajorTom")
    #[serde(rename = "type")]
    pub device_type: String,

    /// Program the device is currently running ("idle" when none)
    pub current_program: String,

    /// Whether the session is live
    pub online: bool,

    /// Action names accepted by `execute_action`
    pub commands: Vec<String>,

    /// Pin projections
    pub pins: Vec<PinSnapshot>,
}
