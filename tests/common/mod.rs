//! Shared test utilities: a scripted Firmata board on the far side of an
//! in-memory duplex link.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use firmata_gateway::device::{self, SessionSettings};
use firmata_gateway::link::Link;
use firmata_gateway::roster::{Roster, RosterEvent};
use firmata_gateway::{DeviceSnapshot, Result};

/// Identity every mock link reports
pub const MOCK_ID: &str = "mock:1";

/// Generous bound for awaiting events; paused-clock tests auto-advance
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Behaviour script for a mock board
#[derive(Clone)]
pub struct BoardProfile {
    pub firmware_name: String,
    pub version: (u8, u8),
    /// Per pin: raw (mode byte, resolution) pairs
    pub capabilities: Vec<Vec<(u8, u8)>>,
    /// Per pin: analog channel (127 = none)
    pub analog_mapping: Vec<u8>,
    /// How many firmware queries to answer (None = all of them)
    pub max_firmware_replies: Option<usize>,
}

impl BoardProfile {
    /// An Uno-shaped board: pins 0-13 digital, pins 14-15 on analog
    /// channels 0 and 1.
    pub fn with_firmware(firmware_name: &str) -> Self {
        let mut capabilities: Vec<Vec<(u8, u8)>> =
            (0..14).map(|_| vec![(0x00, 1), (0x01, 1)]).collect();
        capabilities.push(vec![(0x02, 10)]);
        capabilities.push(vec![(0x02, 10)]);

        let mut analog_mapping = vec![127u8; 14];
        analog_mapping.push(0);
        analog_mapping.push(1);

        Self {
            firmware_name: firmware_name.to_string(),
            version: (2, 5),
            capabilities,
            analog_mapping,
            max_firmware_replies: None,
        }
    }

    pub fn silent() -> Self {
        Self {
            max_firmware_replies: Some(0),
            ..Self::with_firmware("GenericBoard.ino")
        }
    }
}

/// Handle to a running mock board
pub struct MockBoard {
    /// Inject raw Firmata frames toward the gateway
    pub to_gateway: mpsc::UnboundedSender<Vec<u8>>,
    /// Raw chunks the gateway wrote, in arrival order
    pub from_gateway: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Accumulated gateway output for subsequence searches
    pub seen: Vec<u8>,
    task: JoinHandle<()>,
}

impl MockBoard {
    fn spawn(stream: DuplexStream, profile: BoardProfile) -> Self {
        let (inject_tx, mut inject_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let task = tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(stream);
            let mut pending: Vec<u8> = Vec::new();
            let mut replies_left = profile.max_firmware_replies;
            let mut buf = [0u8; 256];

            loop {
                tokio::select! {
                    read = reader.read(&mut buf) => {
                        let Ok(n) = read else { break };
                        if n == 0 {
                            break;
                        }
                        let _ = seen_tx.send(buf[..n].to_vec());
                        pending.extend_from_slice(&buf[..n]);

                        while let Some(payload) = extract_sysex(&mut pending) {
                            let reply = match payload.first().copied() {
                                Some(0x79) => {
                                    match replies_left {
                                        Some(0) => None,
                                        Some(ref mut left) => {
                                            *left -= 1;
                                            Some(firmware_reply(
                                                profile.version,
                                                &profile.firmware_name,
                                            ))
                                        }
                                        None => Some(firmware_reply(
                                            profile.version,
                                            &profile.firmware_name,
                                        )),
                                    }
                                }
                                Some(0x6B) => Some(capability_reply(&profile.capabilities)),
                                Some(0x69) => Some(mapping_reply(&profile.analog_mapping)),
                                _ => None,
                            };
                            if let Some(reply) = reply {
                                if writer.write_all(&reply).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    frame = inject_rx.recv() => match frame {
                        Some(frame) => {
                            if writer.write_all(&frame).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self {
            to_gateway: inject_tx,
            from_gateway: seen_rx,
            seen: Vec::new(),
            task,
        }
    }

    /// Wait until the gateway's output contains the byte sequence
    pub async fn wait_for_bytes(&mut self, needle: &[u8]) {
        self.wait_for_bytes_from(0, needle).await;
    }

    /// Wait until the gateway's output past `offset` contains the
    /// byte sequence
    pub async fn wait_for_bytes_from(&mut self, offset: usize, needle: &[u8]) {
        let deadline = tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                if contains(&self.seen[offset.min(self.seen.len())..], needle) {
                    return;
                }
                match self.from_gateway.recv().await {
                    Some(chunk) => self.seen.extend(chunk),
                    None => panic!("link closed while waiting for {needle:02x?}"),
                }
            }
        });
        deadline
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {needle:02x?}"));
    }

    /// Bytes collected so far (without waiting)
    pub fn drain_seen(&mut self) -> &[u8] {
        while let Ok(chunk) = self.from_gateway.try_recv() {
            self.seen.extend(chunk);
        }
        &self.seen
    }
}

/// Spawn a session over a mock link, returning the board and the
/// session's join handle.
pub fn connect_board(
    profile: BoardProfile,
    roster: &Arc<Roster>,
    settings: SessionSettings,
) -> (MockBoard, JoinHandle<Result<()>>) {
    let (near, far) = tokio::io::duplex(1024);
    let link = Link::from_stream(MOCK_ID, None, Box::new(near));
    let session = device::spawn(link, Arc::clone(roster), None, settings);
    (MockBoard::spawn(far, profile), session)
}

/// Await the next `joined` event
pub async fn expect_joined(events: &mut broadcast::Receiver<RosterEvent>) -> DeviceSnapshot {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await.expect("event feed closed") {
                RosterEvent::Joined(snapshot) => return snapshot,
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for joined")
}

/// Await the next `updated` event
pub async fn expect_updated(events: &mut broadcast::Receiver<RosterEvent>) -> DeviceSnapshot {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await.expect("event feed closed") {
                RosterEvent::Updated(snapshot) => return snapshot,
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for updated")
}

/// Await the next `left` event
pub async fn expect_left(events: &mut broadcast::Receiver<RosterEvent>) -> String {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await.expect("event feed closed") {
                RosterEvent::Left(id) => return id,
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for left")
}

/// Subsequence search
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Index just past the first occurrence of `needle`
pub fn position_after(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| start + needle.len())
}

/// Pull the next complete sysex payload (bytes between 0xF0 and 0xF7)
/// out of the pending buffer, discarding everything up to its end.
fn extract_sysex(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = pending.iter().position(|&b| b == 0xF0)?;
    let end = start + pending[start..].iter().position(|&b| b == 0xF7)?;
    let payload = pending[start + 1..end].to_vec();
    pending.drain(..=end);
    Some(payload)
}

fn firmware_reply(version: (u8, u8), name: &str) -> Vec<u8> {
    let mut frame = vec![0xF0, 0x79, version.0, version.1];
    for byte in name.bytes() {
        frame.push(byte & 0x7F);
        frame.push((byte >> 7) & 0x7F);
    }
    frame.push(0xF7);
    frame
}

fn capability_reply(capabilities: &[Vec<(u8, u8)>]) -> Vec<u8> {
    let mut frame = vec![0xF0, 0x6C];
    for pin in capabilities {
        for (mode, resolution) in pin {
            frame.push(*mode);
            frame.push(*resolution);
        }
        frame.push(0x7F);
    }
    frame.push(0xF7);
    frame
}

fn mapping_reply(channels: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xF0, 0x6A];
    frame.extend_from_slice(channels);
    frame.push(0xF7);
    frame
}
