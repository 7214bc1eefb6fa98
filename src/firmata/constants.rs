//! Firmata protocol constants

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input by pin #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port pair
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Digital message input range upper byte bound
pub const DIGITAL_MESSAGE_BOUND: u8 = 0x9F;
/// Analog message input range upper byte bound
pub const ANALOG_MESSAGE_BOUND: u8 = 0xEF;
//
/// Set a pin to INPUT/OUTPUT/PWM/etc
pub const SET_PIN_MODE: u8 = 0xF4;
//
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
//
/// Start a MIDI Sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI Sysex message
pub const END_SYSEX: u8 = 0xF7;

// Extended command set using sysex (0-127/0x00-0x7F)

/// Communicate with serial devices attached to the board
pub const SERIAL_DATA: u8 = 0x60;
/// Report name and version of the firmware
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Ask for supported modes and resolution of all pins
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for mapping of analog to pin numbers
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with mapping info
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Set the poll rate of the main loop
pub const SAMPLING_INTERVAL: u8 = 0x7A;

// SERIAL_DATA sub-commands (upper nibble; low bits carry the port id)

/// Configure a hardware or software serial port
pub const SERIAL_CONFIG: u8 = 0x10;
/// Write bytes out through a serial port
pub const SERIAL_WRITE: u8 = 0x20;
/// Request reads from a serial port
pub const SERIAL_READ: u8 = 0x30;
/// Bytes read from a serial port
pub const SERIAL_REPLY: u8 = 0x40;

/// First software serial port id
pub const SW_SERIAL0: u8 = 0x08;

// Other values

/// Analog channel value marking a pin as not analog
pub const NOT_ANALOG: u8 = 127;
/// Pin capability list separator in CAPABILITY_RESPONSE
pub const CAPABILITY_PIN_SEPARATOR: u8 = 0x7F;
