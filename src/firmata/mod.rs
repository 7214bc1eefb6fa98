//! Firmata wire protocol
//!
//! The subset of Firmata v2.x the device session drives: firmware
//! identification, capability discovery, sampling, digital/analog I/O, and
//! the serial passthrough. `encode` builds outbound frames, `decode` turns
//! the inbound byte stream into [`FirmataEvent`]s.

pub mod constants;
pub mod decode;
pub mod encode;

pub use decode::{Decoder, FirmataEvent};

/// Mode a hardware pin can be driven in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinMode {
    Input,
    Output,
    Analog,
    Pwm,
    Servo,
    Shift,
    I2c,
    OneWire,
    Stepper,
    Encoder,
    Serial,
    Pullup,
}

impl PinMode {
    /// Decode a Firmata mode byte
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Input),
            0x01 => Some(Self::Output),
            0x02 => Some(Self::Analog),
            0x03 => Some(Self::Pwm),
            0x04 => Some(Self::Servo),
            0x05 => Some(Self::Shift),
            0x06 => Some(Self::I2c),
            0x07 => Some(Self::OneWire),
            0x08 => Some(Self::Stepper),
            0x09 => Some(Self::Encoder),
            0x0A => Some(Self::Serial),
            0x0B => Some(Self::Pullup),
            _ => None,
        }
    }

    /// The Firmata mode byte for this mode
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Input => 0x00,
            Self::Output => 0x01,
            Self::Analog => 0x02,
            Self::Pwm => 0x03,
            Self::Servo => 0x04,
            Self::Shift => 0x05,
            Self::I2c => 0x06,
            Self::OneWire => 0x07,
            Self::Stepper => 0x08,
            Self::Encoder => 0x09,
            Self::Serial => 0x0A,
            Self::Pullup => 0x0B,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_byte_round_trip() {
        for byte in 0x00..=0x0B {
            let mode = PinMode::from_byte(byte).unwrap();
            assert_eq!(mode.as_byte(), byte);
        }
    }

    #[test]
    fn unknown_mode_byte() {
        assert!(PinMode::from_byte(0x7F).is_none());
    }
}
