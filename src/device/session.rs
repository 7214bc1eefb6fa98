//! Per-device session engine
//!
//! One tokio task per attached device drives the whole lifecycle:
//! OPENING → IDENTIFYING → READY → CLOSING → CLOSED. The task owns the
//! link, the decoder, every timer, and the pin cache; nothing of the
//! session outlives the task, so dropping out of the loop releases all
//! timers and listeners at once.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::actions::ActionTable;
use super::variant::{strip_ino, Variant};
use super::{DeviceSnapshot, Pin, PinSnapshot, Pinout, ARDUINO_PINOUT};
use crate::db::DeviceRepository;
use crate::firmata::constants::{NOT_ANALOG, SW_SERIAL0};
use crate::firmata::{encode, Decoder, FirmataEvent, PinMode};
use crate::link::{Link, LinkWriter};
use crate::roster::Roster;
use crate::{Error, Result};

/// Monotonic token distinguishing sessions that share an identity
static SESSION_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Depth of the per-session command queue
const COMMAND_QUEUE: usize = 16;

/// Timer policy of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval between heartbeat firmware queries
    pub heartbeat_interval: Duration,

    /// Deadline for a firmware reply to an outstanding heartbeat
    pub heartbeat_timeout: Duration,

    /// Deadline for reaching READY from link establishment
    pub identify_timeout: Duration,

    /// Sampling interval pushed to the board at READY
    pub sampling_interval_ms: u16,

    /// Built-in LED blink half-period
    pub blink_interval: Duration,

    /// Baud rate for the LedController software serial port
    pub led_serial_baud: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(3),
            heartbeat_timeout: Duration::from_secs(2),
            identify_timeout: Duration::from_secs(10),
            sampling_interval_ms: 1000,
            blink_interval: Duration::from_millis(500),
            led_serial_baud: 9600,
        }
    }
}

/// Command sent into a session task
enum SessionCommand {
    Execute {
        name: String,
        params: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect,
}

/// Cloneable handle to a live session
#[derive(Clone)]
pub struct DeviceHandle {
    id: String,
    token: u64,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl DeviceHandle {
    /// Device identity this handle controls
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Execute a named action on the device
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionUnavailable`] / [`Error::ActionMalformed`]
    /// from dispatch, or [`Error::NotFound`] if the session is gone
    pub async fn execute(&self, action: &str, params: &[String]) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Execute {
                name: action.to_string(),
                params: params.to_vec(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotFound(self.id.clone()))?;
        reply_rx
            .await
            .map_err(|_| Error::NotFound(self.id.clone()))?
    }

    /// Ask the session to close. Best-effort and non-blocking.
    pub fn request_disconnect(&self) {
        let _ = self.cmd_tx.try_send(SessionCommand::Disconnect);
    }
}

#[cfg(test)]
pub(crate) fn test_handle(id: &str) -> DeviceHandle {
    let (cmd_tx, _cmd_rx) = mpsc::channel(1);
    DeviceHandle {
        id: id.to_string(),
        token: SESSION_TOKEN.fetch_add(1, Ordering::Relaxed),
        cmd_tx,
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Opening,
    Identifying,
    Ready,
}

/// Mutable device state shared between the session loop and action
/// handlers. Handlers enqueue frames here; the loop flushes them.
pub struct SessionCore {
    pub(crate) id: String,
    pub(crate) variant: Variant,
    pub(crate) pinout: Pinout,
    pub(crate) firmware_name: String,
    pub(crate) firmware_version: Option<(u8, u8)>,
    pub(crate) vendor_id: Option<u16>,
    pub(crate) product_id: Option<u16>,
    pub(crate) online: bool,
    pub(crate) current_program: String,
    pub(crate) blinking: bool,
    pub(crate) commands: Vec<String>,
    pub(crate) pins: Vec<Pin>,
    pub(crate) previous_analog: Vec<Option<u16>>,
    outbound: Vec<Vec<u8>>,
}

impl SessionCore {
    pub(crate) fn new(id: String, vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        Self {
            id,
            variant: Variant::Generic,
            pinout: ARDUINO_PINOUT,
            firmware_name: String::new(),
            firmware_version: None,
            vendor_id,
            product_id,
            online: false,
            current_program: "idle".to_string(),
            blinking: false,
            commands: Vec::new(),
            pins: Vec::new(),
            previous_analog: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// Enqueue an encoded frame for the next flush
    pub(crate) fn push_frame(&mut self, frame: Vec<u8>) {
        self.outbound.push(frame);
    }

    /// Drain the outbound queue
    pub(crate) fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    /// Drive a digital pin high or low.
    ///
    /// Switches the pin to OUTPUT when needed, then writes the packed
    /// 8-pin port byte built from the cached values of the port's output
    /// pins. Unknown pins are logged and ignored.
    pub(crate) fn digital_write(&mut self, pin_index: u8, high: bool) -> Result<()> {
        let idx = usize::from(pin_index);
        if self.pins.get(idx).is_none() {
            tracing::warn!(device = %self.id, pin = pin_index, "digital write to unknown pin ignored");
            return Ok(());
        }
        if self.pins[idx].mode != Some(PinMode::Output) {
            self.push_frame(encode::set_pin_mode(pin_index, PinMode::Output));
            self.pins[idx].mode = Some(PinMode::Output);
        }
        self.pins[idx].value = u16::from(high);

        let port = pin_index / 8;
        let mut bits: u16 = 0;
        for bit in 0..8u8 {
            let i = usize::from(port) * 8 + usize::from(bit);
            if let Some(pin) = self.pins.get(i) {
                if pin.mode == Some(PinMode::Output) && pin.value != 0 {
                    bits |= 1 << bit;
                }
            }
        }
        self.push_frame(encode::digital_message(port, bits));
        Ok(())
    }

    /// Write a PWM value to a pin
    pub(crate) fn analog_write(&mut self, pin_index: u8, value: u16) -> Result<()> {
        let idx = usize::from(pin_index);
        let Some(pin) = self.pins.get(idx) else {
            return Err(Error::ActionMalformed(format!("unknown pin {pin_index}")));
        };
        if !pin.supports(PinMode::Pwm) && !pin.is_analog() {
            tracing::warn!(device = %self.id, pin = pin_index, "pin does not accept analog writes, ignoring");
            return Ok(());
        }
        if self.pins[idx].mode != Some(PinMode::Pwm) && self.pins[idx].supports(PinMode::Pwm) {
            self.push_frame(encode::set_pin_mode(pin_index, PinMode::Pwm));
            self.pins[idx].mode = Some(PinMode::Pwm);
        }
        self.pins[idx].value = value.min(0x3FFF);
        self.push_frame(encode::analog_message(pin_index, value));
        Ok(())
    }

    /// Derive the discrete snapshot shipped to external consumers
    pub(crate) fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id.clone(),
            name: self.firmware_name.clone(),
            firmware_version: self
                .firmware_version
                .map(|(major, minor)| format!("{major}.{minor}")),
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            device_type: self.variant.as_str().to_string(),
            current_program: self.current_program.clone(),
            online: self.online,
            commands: self.commands.clone(),
            pins: self
                .pins
                .iter()
                .enumerate()
                .map(|(index, pin)| PinSnapshot {
                    index: index as u8,
                    supported_modes: pin.supported_modes.clone(),
                    mode: pin.mode,
                    value: pin.value,
                    analog_channel: pin.analog_channel,
                })
                .collect(),
        }
    }
}

/// Everything the event handlers need besides the link halves
struct Session {
    core: SessionCore,
    table: ActionTable,
    state: State,
    capabilities_seen: bool,
    mapping_seen: bool,
    registered: bool,
    heartbeat_ack: bool,
    handle: DeviceHandle,
    roster: Arc<Roster>,
    repository: Option<Arc<dyn DeviceRepository>>,
    settings: SessionSettings,
}

impl Session {
    fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// Consume the heartbeat acknowledgement flag
    fn take_heartbeat_ack(&mut self) -> bool {
        std::mem::take(&mut self.heartbeat_ack)
    }

    fn on_event(&mut self, event: FirmataEvent) {
        match event {
            FirmataEvent::FirmwareReport { major, minor, name } => {
                if self.state == State::Opening {
                    self.identify(major, minor, &name);
                } else {
                    self.heartbeat_ack = true;
                }
            }
            FirmataEvent::Capability(rows) => {
                if self.state == State::Identifying {
                    self.core.pins = rows.iter().map(|row| Pin::from_capability(row)).collect();
                    self.core.previous_analog = vec![None; self.core.pins.len()];
                    self.capabilities_seen = true;
                    self.maybe_ready();
                }
            }
            FirmataEvent::AnalogMapping(channels) => {
                if self.state == State::Identifying {
                    for (index, channel) in channels.iter().enumerate() {
                        if let Some(pin) = self.core.pins.get_mut(index) {
                            pin.analog_channel = *channel;
                        }
                    }
                    self.mapping_seen = true;
                    self.maybe_ready();
                }
            }
            FirmataEvent::Digital { port, bits } => {
                if self.is_ready() {
                    self.on_digital(port, bits);
                }
            }
            FirmataEvent::Analog { channel, value } => {
                if self.is_ready() {
                    self.on_analog(channel, value);
                }
            }
            FirmataEvent::SerialData { port, data } => {
                tracing::debug!(
                    device = %self.core.id,
                    port,
                    bytes = data.len(),
                    "serial passthrough data"
                );
            }
            FirmataEvent::ProtocolVersion { major, minor } => {
                tracing::debug!(device = %self.core.id, major, minor, "protocol version");
            }
        }
    }

    /// First firmware reply: resolve the variant and request capabilities
    fn identify(&mut self, major: u8, minor: u8, raw_name: &str) {
        let name = strip_ino(raw_name).to_string();
        let variant = Variant::resolve(raw_name);

        self.core.firmware_name = name;
        self.core.firmware_version = Some((major, minor));
        self.core.variant = variant;
        self.core.pinout = variant.pinout();
        self.table = ActionTable::for_variant(variant);
        self.core.commands = self.table.names();
        self.state = State::Identifying;

        self.core.push_frame(encode::query_capabilities());
        self.core.push_frame(encode::query_analog_mapping());

        tracing::info!(
            device = %self.core.id,
            firmware = %self.core.firmware_name,
            version = %format_args!("{major}.{minor}"),
            variant = variant.as_str(),
            "device identified"
        );
    }

    /// Enter READY once capabilities and the analog mapping are in
    fn maybe_ready(&mut self) {
        if !(self.capabilities_seen && self.mapping_seen) {
            return;
        }
        self.state = State::Ready;

        self.core
            .push_frame(encode::sampling_interval(self.settings.sampling_interval_ms));

        // Enable digital reporting on every INPUT-capable digital pin
        let mut ports = BTreeSet::new();
        for index in 0..self.core.pins.len() {
            let pin = &self.core.pins[index];
            if pin.is_digital() && pin.supports(PinMode::Input) {
                let pin_index = index as u8;
                self.core
                    .push_frame(encode::set_pin_mode(pin_index, PinMode::Input));
                self.core.pins[index].mode = Some(PinMode::Input);
                ports.insert(pin_index / 8);
            }
        }
        for port in ports {
            self.core.push_frame(encode::report_digital(port, true));
        }

        // Enable analog reporting on every analog pin
        for index in 0..self.core.pins.len() {
            let pin = &self.core.pins[index];
            if pin.is_analog() && pin.analog_channel != NOT_ANALOG {
                let pin_index = index as u8;
                let channel = pin.analog_channel;
                self.core
                    .push_frame(encode::set_pin_mode(pin_index, PinMode::Analog));
                self.core.pins[index].mode = Some(PinMode::Analog);
                self.core.push_frame(encode::report_analog(channel, true));
            }
        }

        // LedController talks to its strip through software serial 0
        if self.core.variant == Variant::LedController {
            self.core.push_frame(encode::serial_config(
                SW_SERIAL0,
                self.settings.led_serial_baud,
                Some((self.core.pinout.rx, self.core.pinout.tx)),
            ));
        }

        self.core.online = true;
        self.roster.add(self.handle.clone(), self.core.snapshot());
        self.registered = true;

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.upsert(
                &self.core.id,
                &self.core.firmware_name,
                self.core.variant.as_str(),
            ) {
                tracing::warn!(device = %self.core.id, error = %e, "device upsert failed");
            }
        }

        tracing::info!(device = %self.core.id, pins = self.core.pins.len(), "device ready");
    }

    /// Digital report: update the port's input pins and always emit
    fn on_digital(&mut self, port: u8, bits: u16) {
        for bit in 0..8u8 {
            let index = usize::from(port) * 8 + usize::from(bit);
            if let Some(pin) = self.core.pins.get_mut(index) {
                if matches!(pin.mode, Some(PinMode::Input | PinMode::Pullup)) {
                    pin.value = (bits >> bit) & 1;
                }
            }
        }
        self.emit_update();
    }

    /// Analog report: emit only on transitions from the previous reading
    fn on_analog(&mut self, channel: u8, value: u16) {
        let Some(index) = self
            .core
            .pins
            .iter()
            .position(|pin| pin.analog_channel == channel)
        else {
            tracing::debug!(device = %self.core.id, channel, "analog report for unmapped channel");
            return;
        };
        if self.core.previous_analog[index] == Some(value) {
            return;
        }
        self.core.previous_analog[index] = Some(value);
        self.core.pins[index].value = value;
        self.emit_update();
    }

    /// Validate and run an action; emit an update after dispatch
    fn execute(&mut self, name: &str, params: &[String]) -> Result<()> {
        let result = self.table.dispatch(&mut self.core, name, params);
        match &result {
            Ok(()) => self.emit_update(),
            Err(e) => {
                tracing::warn!(device = %self.core.id, action = name, error = %e, "action rejected");
            }
        }
        result
    }

    /// Toggle the built-in LED (blink interval body)
    fn blink_tick(&mut self) {
        let led = self.core.pinout.led;
        let high = self
            .core
            .pins
            .get(usize::from(led))
            .is_some_and(|pin| pin.value == 0);
        let _ = self.core.digital_write(led, high);
    }

    fn emit_update(&mut self) {
        if self.registered {
            self.roster.update(self.core.snapshot());
        }
    }
}

/// Spawn a session task over an established link.
///
/// The task registers with the roster at READY and retires itself on any
/// exit path. The join handle resolves with the session outcome:
/// `Ok(())` for an orderly close, the terminating error otherwise.
pub fn spawn(
    link: Link,
    roster: Arc<Roster>,
    repository: Option<Arc<dyn DeviceRepository>>,
    settings: SessionSettings,
) -> JoinHandle<Result<()>> {
    tokio::spawn(run(link, roster, repository, settings))
}

/// Drive one session from link establishment to CLOSED
async fn run(
    link: Link,
    roster: Arc<Roster>,
    repository: Option<Arc<dyn DeviceRepository>>,
    settings: SessionSettings,
) -> Result<()> {
    let id = link.identity().to_string();
    let usb = link.usb_info();
    let (cmd_tx, mut cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let handle = DeviceHandle {
        id: id.clone(),
        token: SESSION_TOKEN.fetch_add(1, Ordering::Relaxed),
        cmd_tx,
    };

    let mut session = Session {
        core: SessionCore::new(id.clone(), usb.map(|(v, _)| v), usb.map(|(_, p)| p)),
        table: ActionTable::for_variant(Variant::Generic),
        state: State::Opening,
        capabilities_seen: false,
        mapping_seen: false,
        registered: false,
        heartbeat_ack: false,
        handle: handle.clone(),
        roster: Arc::clone(&roster),
        repository,
        settings: settings.clone(),
    };

    let (mut reader, mut writer) = link.split();
    let mut decoder = Decoder::new();

    // Timers. All of them live on this task's stack: leaving the loop
    // is what cancels them.
    let identify_deadline = time::sleep(settings.identify_timeout);
    tokio::pin!(identify_deadline);
    let heartbeat_deadline = time::sleep(settings.heartbeat_timeout);
    tokio::pin!(heartbeat_deadline);
    let mut heartbeat_armed = false;
    let mut heartbeat = time::interval_at(
        Instant::now() + settings.heartbeat_interval,
        settings.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut blink = time::interval(settings.blink_interval);
    blink.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(device = %id, "session opening");
    session.core.push_frame(encode::query_firmware());

    let mut result = flush(&mut writer, &mut session.core).await;
    if result.is_ok() {
        result = loop {
            tokio::select! {
                chunk = reader.read_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        for event in decoder.decode(&bytes) {
                            session.on_event(event);
                        }
                        if session.take_heartbeat_ack() {
                            heartbeat_armed = false;
                        }
                        if let Err(e) = flush(&mut writer, &mut session.core).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => break Err(Error::LinkClosed),
                    Err(_) => break Err(Error::LinkClosed),
                },

                () = &mut identify_deadline, if !session.is_ready() => {
                    break Err(Error::ConnectionTimeout(id.clone()));
                }

                _ = heartbeat.tick(), if session.is_ready() && !heartbeat_armed => {
                    session.core.push_frame(encode::query_firmware());
                    if let Err(e) = flush(&mut writer, &mut session.core).await {
                        break Err(e);
                    }
                    heartbeat_deadline
                        .as_mut()
                        .reset(Instant::now() + settings.heartbeat_timeout);
                    heartbeat_armed = true;
                }

                () = &mut heartbeat_deadline, if heartbeat_armed => {
                    break Err(Error::HeartbeatTimeout(id.clone()));
                }

                _ = blink.tick(), if session.core.blinking => {
                    session.blink_tick();
                    if let Err(e) = flush(&mut writer, &mut session.core).await {
                        break Err(e);
                    }
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Execute { name, params, reply }) => {
                        let outcome = session.execute(&name, &params);
                        if let Err(e) = flush(&mut writer, &mut session.core).await {
                            let _ = reply.send(outcome);
                            break Err(e);
                        }
                        let _ = reply.send(outcome);
                    }
                    Some(SessionCommand::Disconnect) | None => break Ok(()),
                },
            }
        };
    }

    // CLOSING: the loop is gone, and with it every timer. Mark offline,
    // close the link, retire from the roster.
    session.core.online = false;
    session.core.blinking = false;
    writer.close().await;
    if session.registered {
        roster.retire(&handle);
    }

    match &result {
        Ok(()) => tracing::info!(device = %id, "session closed"),
        Err(e) => tracing::warn!(device = %id, error = %e, "session terminated"),
    }
    result
}

/// Write every queued frame to the link
async fn flush(writer: &mut LinkWriter, core: &mut SessionCore) -> Result<()> {
    for frame in core.take_outbound() {
        writer.write_all(&frame).await?;
    }
    Ok(())
}
