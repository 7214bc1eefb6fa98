//! Device variant resolution
//!
//! The firmware name reported by a board is the sole source of variant
//! identity. A session's variant is fixed for its lifetime.

use super::{Pinout, ARDUINO_PINOUT};

/// Device variant selected from the identified firmware name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Any firmware not otherwise recognised
    Generic,
    /// LED strip controller addressed through the board's UART
    LedController,
    /// Extended device type; resolved here, specialised elsewhere
    MajorTom,
}

impl Variant {
    /// Resolve a variant from a firmware name.
    ///
    /// The recommended firmware naming convention is
    /// `<variant>_<unique>.ino`; the `.ino` suffix is stripped first and
    /// the token before the first underscore selects the variant.
    #[must_use]
    pub fn resolve(firmware_name: &str) -> Self {
        let name = strip_ino(firmware_name);
        match name.split('_').next().unwrap_or(name) {
            "LedController" => Self::LedController,
            "MajorTom" => Self::MajorTom,
            _ => Self::Generic,
        }
    }

    /// Variant tag as exported in the discrete snapshot
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "Generic",
            Self::LedController => "LedController",
            Self::MajorTom => "MajorTom",
        }
    }

    /// Conventional pin map for this variant's board architecture
    #[must_use]
    pub fn pinout(self) -> Pinout {
        ARDUINO_PINOUT
    }
}

/// Strip a trailing `.ino` token from a firmware name
#[must_use]
pub fn strip_ino(name: &str) -> &str {
    name.strip_suffix(".ino").unwrap_or(name)
}
