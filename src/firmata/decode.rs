//! Streaming Firmata decoder
//!
//! Consumes raw link chunks and yields typed [`FirmataEvent`]s. Malformed
//! input never poisons the stream: bad bytes are logged and dropped, and
//! decoding re-synchronises at the next command byte.

use super::constants::{
    ANALOG_MAPPING_RESPONSE, ANALOG_MESSAGE, ANALOG_MESSAGE_BOUND, CAPABILITY_PIN_SEPARATOR,
    CAPABILITY_RESPONSE, DIGITAL_MESSAGE, DIGITAL_MESSAGE_BOUND, END_SYSEX, REPORT_FIRMWARE,
    REPORT_VERSION, SERIAL_DATA, SERIAL_REPLY, START_SYSEX,
};
use super::PinMode;

/// A decoded inbound Firmata message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmataEvent {
    /// REPORT_FIRMWARE reply: version pair and firmware name
    FirmwareReport {
        major: u8,
        minor: u8,
        name: String,
    },
    /// CAPABILITY_RESPONSE: per pin, the supported (mode, resolution) pairs
    Capability(Vec<Vec<(PinMode, u8)>>),
    /// ANALOG_MAPPING_RESPONSE: per pin, the analog channel (127 = none)
    AnalogMapping(Vec<u8>),
    /// DIGITAL_MESSAGE: packed 8-pin state of one port
    Digital { port: u8, bits: u16 },
    /// ANALOG_MESSAGE: 14-bit reading for one channel
    Analog { channel: u8, value: u16 },
    /// SERIAL_REPLY passthrough bytes from a board serial port
    SerialData { port: u8, data: Vec<u8> },
    /// REPORT_VERSION protocol version pair
    ProtocolVersion { major: u8, minor: u8 },
}

enum DecodeState {
    /// Waiting for a command byte
    Idle,
    /// Inside a fixed-length message; `command` keeps the full command byte
    Fixed { command: u8, data: Vec<u8> },
    /// Inside a sysex frame
    Sysex { payload: Vec<u8> },
}

/// Incremental decoder over the inbound byte stream
pub struct Decoder {
    state: DecodeState,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder waiting for the first command byte
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
        }
    }

    /// Feed a chunk of link bytes, returning every completed event
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<FirmataEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if let Some(event) = self.push(byte) {
                events.push(event);
            }
        }
        events
    }

    fn push(&mut self, byte: u8) -> Option<FirmataEvent> {
        // A command byte always wins: it terminates whatever was in
        // flight and starts a new message (sysex excepted, where only
        // END_SYSEX is legal).
        if byte >= 0x80 {
            match &mut self.state {
                DecodeState::Sysex { payload } => {
                    if byte == END_SYSEX {
                        let payload = std::mem::take(payload);
                        self.state = DecodeState::Idle;
                        return parse_sysex(&payload);
                    }
                    tracing::debug!(byte, "command byte inside sysex, resyncing");
                    self.state = DecodeState::Idle;
                    return self.start_command(byte);
                }
                DecodeState::Fixed { command, .. } => {
                    tracing::debug!(command = *command, "truncated message, resyncing");
                    self.state = DecodeState::Idle;
                    return self.start_command(byte);
                }
                DecodeState::Idle => return self.start_command(byte),
            }
        }

        match &mut self.state {
            DecodeState::Idle => {
                tracing::debug!(byte, "stray data byte discarded");
                None
            }
            DecodeState::Sysex { payload } => {
                payload.push(byte);
                None
            }
            DecodeState::Fixed { command, data } => {
                data.push(byte);
                if data.len() == 2 {
                    let command = *command;
                    let (lsb, msb) = (data[0], data[1]);
                    self.state = DecodeState::Idle;
                    return parse_fixed(command, lsb, msb);
                }
                None
            }
        }
    }

    fn start_command(&mut self, byte: u8) -> Option<FirmataEvent> {
        match byte {
            START_SYSEX => {
                self.state = DecodeState::Sysex {
                    payload: Vec::new(),
                };
            }
            DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND
            | ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND
            | REPORT_VERSION => {
                self.state = DecodeState::Fixed {
                    command: byte,
                    data: Vec::with_capacity(2),
                };
            }
            END_SYSEX => {
                tracing::debug!("END_SYSEX without START_SYSEX discarded");
            }
            other => {
                tracing::debug!(command = other, "unsupported command discarded");
            }
        }
        None
    }
}

fn parse_fixed(command: u8, lsb: u8, msb: u8) -> Option<FirmataEvent> {
    let value = u16::from(lsb) | (u16::from(msb) << 7);
    match command {
        DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND => Some(FirmataEvent::Digital {
            port: command & 0x0F,
            bits: value,
        }),
        ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND => Some(FirmataEvent::Analog {
            channel: command & 0x0F,
            value,
        }),
        REPORT_VERSION => Some(FirmataEvent::ProtocolVersion {
            major: lsb,
            minor: msb,
        }),
        _ => None,
    }
}

fn parse_sysex(payload: &[u8]) -> Option<FirmataEvent> {
    let (&command, body) = payload.split_first()?;
    match command {
        REPORT_FIRMWARE => parse_firmware_report(body),
        CAPABILITY_RESPONSE => Some(parse_capabilities(body)),
        ANALOG_MAPPING_RESPONSE => Some(FirmataEvent::AnalogMapping(body.to_vec())),
        SERIAL_DATA => parse_serial_reply(body),
        other => {
            tracing::debug!(sysex = other, "unhandled sysex discarded");
            None
        }
    }
}

/// REPORT_FIRMWARE body: major, minor, then the name as 14-bit chars
/// (two 7-bit bytes per char, LSB first).
fn parse_firmware_report(body: &[u8]) -> Option<FirmataEvent> {
    if body.len() < 2 {
        tracing::debug!("short REPORT_FIRMWARE reply discarded");
        return None;
    }
    let (major, minor) = (body[0], body[1]);
    let name = body[2..]
        .chunks(2)
        .map(|pair| {
            let low = u16::from(pair[0]);
            let high = pair.get(1).map_or(0, |b| u16::from(*b));
            char::from_u32(u32::from(low | (high << 7))).unwrap_or('\u{FFFD}')
        })
        .collect::<String>();
    Some(FirmataEvent::FirmwareReport { major, minor, name })
}

/// CAPABILITY_RESPONSE body: per pin, (mode, resolution) pairs closed by
/// 0x7F. Unknown mode bytes are skipped with their resolution.
fn parse_capabilities(body: &[u8]) -> FirmataEvent {
    let mut pins = Vec::new();
    let mut current = Vec::new();
    let mut iter = body.iter();
    while let Some(&byte) = iter.next() {
        if byte == CAPABILITY_PIN_SEPARATOR {
            pins.push(std::mem::take(&mut current));
            continue;
        }
        let Some(&resolution) = iter.next() else {
            tracing::debug!("truncated capability pair discarded");
            break;
        };
        if let Some(mode) = PinMode::from_byte(byte) {
            current.push((mode, resolution));
        }
    }
    FirmataEvent::Capability(pins)
}

/// SERIAL_DATA reply: sub-command 0x40|port, then 7-bit byte pairs.
fn parse_serial_reply(body: &[u8]) -> Option<FirmataEvent> {
    let (&sub, data) = body.split_first()?;
    if sub & 0xF0 != SERIAL_REPLY {
        tracing::debug!(sub, "non-reply serial sysex discarded");
        return None;
    }
    let bytes = data
        .chunks(2)
        .map(|pair| {
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0);
            low | (high << 7)
        })
        .collect();
    Some(FirmataEvent::SerialData {
        port: sub & 0x0F,
        data: bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firmware_reply(major: u8, minor: u8, name: &str) -> Vec<u8> {
        let mut frame = vec![START_SYSEX, REPORT_FIRMWARE, major, minor];
        for ch in name.bytes() {
            frame.push(ch & 0x7F);
            frame.push((ch >> 7) & 0x7F);
        }
        frame.push(END_SYSEX);
        frame
    }

    #[test]
    fn decodes_firmware_report() {
        let mut decoder = Decoder::new();
        let events = decoder.decode(&firmware_reply(2, 5, "GenericBoard.ino"));
        assert_eq!(
            events,
            vec![FirmataEvent::FirmwareReport {
                major: 2,
                minor: 5,
                name: "GenericBoard.ino".to_string(),
            }]
        );
    }

    #[test]
    fn decodes_digital_and_analog_messages() {
        let mut decoder = Decoder::new();
        let events = decoder.decode(&[0x90, 0x04, 0x00, 0xE3, 0x68, 0x07]);
        assert_eq!(
            events,
            vec![
                FirmataEvent::Digital { port: 0, bits: 4 },
                FirmataEvent::Analog {
                    channel: 3,
                    value: 1000
                },
            ]
        );
    }

    #[test]
    fn decodes_capability_response() {
        // Pin 0: INPUT/1, OUTPUT/1. Pin 1: ANALOG/10.
        let frame = vec![
            START_SYSEX,
            CAPABILITY_RESPONSE,
            0x00,
            0x01,
            0x01,
            0x01,
            0x7F,
            0x02,
            0x0A,
            0x7F,
            END_SYSEX,
        ];
        let mut decoder = Decoder::new();
        let events = decoder.decode(&frame);
        assert_eq!(
            events,
            vec![FirmataEvent::Capability(vec![
                vec![(PinMode::Input, 1), (PinMode::Output, 1)],
                vec![(PinMode::Analog, 10)],
            ])]
        );
    }

    #[test]
    fn decodes_analog_mapping() {
        let frame = vec![
            START_SYSEX,
            ANALOG_MAPPING_RESPONSE,
            127,
            127,
            0,
            1,
            END_SYSEX,
        ];
        let mut decoder = Decoder::new();
        assert_eq!(
            decoder.decode(&frame),
            vec![FirmataEvent::AnalogMapping(vec![127, 127, 0, 1])]
        );
    }

    #[test]
    fn decodes_serial_reply_pairs() {
        let frame = vec![
            START_SYSEX,
            SERIAL_DATA,
            SERIAL_REPLY | 0x08,
            0x7F,
            0x01, // 255
            0x41,
            0x00, // 'A'
            END_SYSEX,
        ];
        let mut decoder = Decoder::new();
        assert_eq!(
            decoder.decode(&frame),
            vec![FirmataEvent::SerialData {
                port: 8,
                data: vec![255, b'A'],
            }]
        );
    }

    #[test]
    fn sysex_payload_round_trip() {
        // Any payload of bytes < 128 survives framing untouched.
        let payload: Vec<u8> = (0..128).collect();
        let mut frame = vec![START_SYSEX, ANALOG_MAPPING_RESPONSE];
        frame.extend_from_slice(&payload);
        frame.push(END_SYSEX);

        let mut decoder = Decoder::new();
        let events = decoder.decode(&frame);
        assert_eq!(events, vec![FirmataEvent::AnalogMapping(payload)]);
    }

    #[test]
    fn resyncs_after_garbage() {
        let mut decoder = Decoder::new();
        // Stray data bytes, then a truncated digital message interrupted
        // by a fresh analog message.
        let mut events = decoder.decode(&[0x12, 0x34, 0x90, 0x04]);
        assert!(events.is_empty());
        events = decoder.decode(&[0xE0, 0x01, 0x00]);
        assert_eq!(
            events,
            vec![FirmataEvent::Analog {
                channel: 0,
                value: 1
            }]
        );
    }

    #[test]
    fn resyncs_on_command_inside_sysex() {
        let mut decoder = Decoder::new();
        // Sysex interrupted by a digital message: the sysex is dropped,
        // the digital message decodes.
        let events = decoder.decode(&[START_SYSEX, REPORT_FIRMWARE, 0x02, 0x90, 0x01, 0x00]);
        assert_eq!(events, vec![FirmataEvent::Digital { port: 0, bits: 1 }]);
    }

    #[test]
    fn split_chunks_decode_like_one() {
        let frame = firmware_reply(2, 5, "LedController_01.ino");
        let mut whole = Decoder::new();
        let expected = whole.decode(&frame);

        let mut split = Decoder::new();
        let mut events = Vec::new();
        for chunk in frame.chunks(3) {
            events.extend(split.decode(chunk));
        }
        assert_eq!(events, expected);
    }
}
