//! Outbound Firmata frame builders
//!
//! Every builder returns a complete frame ready for the link. 14-bit
//! values are split LSB-first, 7 bits per byte; sysex payload bytes are
//! kept below 0x80.

use super::constants::{
    ANALOG_MAPPING_QUERY, ANALOG_MESSAGE, CAPABILITY_QUERY, DIGITAL_MESSAGE, END_SYSEX,
    REPORT_ANALOG, REPORT_DIGITAL, REPORT_FIRMWARE, SAMPLING_INTERVAL, SERIAL_CONFIG, SERIAL_DATA,
    SERIAL_READ, SERIAL_WRITE, SET_PIN_MODE, START_SYSEX,
};
use super::PinMode;

/// Ask the board for its firmware name and version
#[must_use]
pub fn query_firmware() -> Vec<u8> {
    vec![START_SYSEX, REPORT_FIRMWARE, END_SYSEX]
}

/// Ask the board for the supported modes of every pin
#[must_use]
pub fn query_capabilities() -> Vec<u8> {
    vec![START_SYSEX, CAPABILITY_QUERY, END_SYSEX]
}

/// Ask the board for the analog channel of every pin
#[must_use]
pub fn query_analog_mapping() -> Vec<u8> {
    vec![START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX]
}

/// Set the board's sampling interval in milliseconds (14-bit)
#[must_use]
pub fn sampling_interval(millis: u16) -> Vec<u8> {
    let millis = millis.min(0x3FFF);
    vec![
        START_SYSEX,
        SAMPLING_INTERVAL,
        (millis & 0x7F) as u8,
        ((millis >> 7) & 0x7F) as u8,
        END_SYSEX,
    ]
}

/// Set the mode of a single pin
#[must_use]
pub fn set_pin_mode(pin: u8, mode: PinMode) -> Vec<u8> {
    vec![SET_PIN_MODE, pin & 0x7F, mode.as_byte()]
}

/// Write the packed 8-pin state of a digital port
#[must_use]
pub fn digital_message(port: u8, bits: u16) -> Vec<u8> {
    vec![
        DIGITAL_MESSAGE | (port & 0x0F),
        (bits & 0x7F) as u8,
        ((bits >> 7) & 0x7F) as u8,
    ]
}

/// Enable or disable digital reporting for a port
#[must_use]
pub fn report_digital(port: u8, enabled: bool) -> Vec<u8> {
    vec![REPORT_DIGITAL | (port & 0x0F), u8::from(enabled)]
}

/// Write a 14-bit analog (PWM/servo) value to a pin
#[must_use]
pub fn analog_message(pin: u8, value: u16) -> Vec<u8> {
    let value = value.min(0x3FFF);
    vec![
        ANALOG_MESSAGE | (pin & 0x0F),
        (value & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
    ]
}

/// Enable or disable analog reporting for a channel
#[must_use]
pub fn report_analog(channel: u8, enabled: bool) -> Vec<u8> {
    vec![REPORT_ANALOG | (channel & 0x0F), u8::from(enabled)]
}

/// Configure a serial port on the board.
///
/// Software serial ports additionally carry their RX/TX pin assignment.
#[must_use]
pub fn serial_config(port: u8, baud: u32, pins: Option<(u8, u8)>) -> Vec<u8> {
    let mut frame = vec![
        START_SYSEX,
        SERIAL_DATA,
        SERIAL_CONFIG | (port & 0x0F),
        (baud & 0x7F) as u8,
        ((baud >> 7) & 0x7F) as u8,
        ((baud >> 14) & 0x7F) as u8,
    ];
    if let Some((rx, tx)) = pins {
        frame.push(rx & 0x7F);
        frame.push(tx & 0x7F);
    }
    frame.push(END_SYSEX);
    frame
}

/// Start or stop continuous reads from a serial port on the board.
///
/// Replies arrive as SERIAL_REPLY sysex and decode into
/// [`super::FirmataEvent::SerialData`].
#[must_use]
pub fn serial_read(port: u8, enabled: bool) -> Vec<u8> {
    vec![
        START_SYSEX,
        SERIAL_DATA,
        SERIAL_READ | (port & 0x0F),
        u8::from(!enabled),
        END_SYSEX,
    ]
}

/// Write bytes through a serial port on the board.
///
/// Each payload byte is expanded into two 7-bit bytes, LSB first.
#[must_use]
pub fn serial_write(port: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + data.len() * 2);
    frame.push(START_SYSEX);
    frame.push(SERIAL_DATA);
    frame.push(SERIAL_WRITE | (port & 0x0F));
    for byte in data {
        frame.push(byte & 0x7F);
        frame.push((byte >> 7) & 0x7F);
    }
    frame.push(END_SYSEX);
    frame
}
