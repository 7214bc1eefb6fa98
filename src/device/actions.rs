//! Named-action dispatch
//!
//! Each variant contributes a table mapping uppercase action names to a
//! parameter contract and a handler. Handlers run inside the session task
//! and enqueue encoded Firmata frames on the session's outbound queue;
//! they never perform I/O themselves.

use std::collections::BTreeMap;
use std::str::FromStr;

use super::session::SessionCore;
use super::variant::Variant;
use crate::firmata::constants::SW_SERIAL0;
use crate::firmata::encode;
use crate::{Error, Result};

/// Handler invoked with the session core and raw string parameters
pub type ActionHandler = fn(&mut SessionCore, &[String]) -> Result<()>;

/// One entry of an action table
pub struct ActionSpec {
    /// Whether dispatch rejects an empty parameter list up front
    pub requires_params: bool,
    handler: ActionHandler,
}

/// Action table of one device variant
pub struct ActionTable {
    actions: BTreeMap<&'static str, ActionSpec>,
}

impl ActionTable {
    /// Build the action table for a variant.
    ///
    /// Every variant carries the generic actions; `LedController` adds its
    /// serial-framed commands on top.
    #[must_use]
    pub fn for_variant(variant: Variant) -> Self {
        let mut actions: BTreeMap<&'static str, ActionSpec> = BTreeMap::new();
        actions.insert(
            "BLINKON",
            ActionSpec {
                requires_params: false,
                handler: blink_on,
            },
        );
        actions.insert(
            "BLINKOFF",
            ActionSpec {
                requires_params: false,
                handler: blink_off,
            },
        );
        actions.insert(
            "TOGGLELED",
            ActionSpec {
                requires_params: false,
                handler: toggle_led,
            },
        );
        actions.insert(
            "SETPINVALUE",
            ActionSpec {
                requires_params: true,
                handler: set_pin_value,
            },
        );

        if variant == Variant::LedController {
            actions.insert(
                "RAINBOW",
                ActionSpec {
                    requires_params: false,
                    handler: |core, params| led_command(core, b'R', 0, params),
                },
            );
            actions.insert(
                "KITT",
                ActionSpec {
                    requires_params: true,
                    handler: |core, params| led_command(core, b'K', 3, params),
                },
            );
            actions.insert(
                "PULSECOLOR",
                ActionSpec {
                    requires_params: true,
                    handler: |core, params| led_command(core, b'P', 2, params),
                },
            );
            actions.insert(
                "SETCOLOR",
                ActionSpec {
                    requires_params: true,
                    handler: |core, params| led_command(core, b'C', 3, params),
                },
            );
            actions.insert(
                "SETBRIGHTNESS",
                ActionSpec {
                    requires_params: true,
                    handler: |core, params| led_command(core, b'B', 1, params),
                },
            );
        }

        Self { actions }
    }

    /// Action names exported in the discrete snapshot
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.actions.keys().map(ToString::to_string).collect()
    }

    /// Validate and run an action against the session core.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionUnavailable`] for unknown names and
    /// [`Error::ActionMalformed`] for missing or out-of-domain parameters.
    pub fn dispatch(&self, core: &mut SessionCore, name: &str, params: &[String]) -> Result<()> {
        let name = name.to_uppercase();
        let spec = self
            .actions
            .get(name.as_str())
            .ok_or_else(|| Error::ActionUnavailable(name.clone()))?;
        if spec.requires_params && params.is_empty() {
            return Err(Error::ActionMalformed(format!("{name} requires parameters")));
        }
        (spec.handler)(core, params)
    }
}

/// Parse one positional parameter, mapping failures to `ActionMalformed`
fn param<T: FromStr>(params: &[String], index: usize, name: &str) -> Result<T> {
    let raw = params
        .get(index)
        .ok_or_else(|| Error::ActionMalformed(format!("missing parameter `{name}`")))?;
    raw.parse()
        .map_err(|_| Error::ActionMalformed(format!("parameter `{name}` invalid: {raw}")))
}

fn blink_on(core: &mut SessionCore, _params: &[String]) -> Result<()> {
    if core.blinking {
        tracing::warn!(device = %core.id, "blink already running");
        return Ok(());
    }
    core.blinking = true;
    core.current_program = "blink".to_string();
    Ok(())
}

fn blink_off(core: &mut SessionCore, _params: &[String]) -> Result<()> {
    core.blinking = false;
    core.current_program = "idle".to_string();
    let led = core.pinout.led;
    core.digital_write(led, false)
}

fn toggle_led(core: &mut SessionCore, _params: &[String]) -> Result<()> {
    let led = core.pinout.led;
    let high = core
        .pins
        .get(usize::from(led))
        .is_some_and(|pin| pin.value == 0);
    core.digital_write(led, high)
}

fn set_pin_value(core: &mut SessionCore, params: &[String]) -> Result<()> {
    let pin_index: u8 = param(params, 0, "pin")?;
    let value: u16 = param(params, 1, "value")?;

    let pin = core
        .pins
        .get(usize::from(pin_index))
        .ok_or_else(|| Error::ActionMalformed(format!("unknown pin {pin_index}")))?;

    if pin.is_digital() {
        match value {
            0 | 1 => core.digital_write(pin_index, value == 1),
            other => {
                tracing::warn!(
                    device = %core.id,
                    pin = pin_index,
                    value = other,
                    "digital pin accepts only 0 or 1, ignoring"
                );
                Ok(())
            }
        }
    } else {
        core.analog_write(pin_index, value)
    }
}

/// Build and enqueue an LED controller command.
///
/// The payload is `['[', letter, params…, ']']`; each parameter must fit
/// in 8 bits. It leaves the board through the software serial passthrough
/// configured at READY.
fn led_command(core: &mut SessionCore, letter: u8, arity: usize, params: &[String]) -> Result<()> {
    if params.len() < arity {
        return Err(Error::ActionMalformed(format!(
            "expected {arity} parameters, got {}",
            params.len()
        )));
    }
    let mut payload = Vec::with_capacity(arity + 3);
    payload.push(b'[');
    payload.push(letter);
    for index in 0..arity {
        let value: u8 = param(params, index, "value")?;
        payload.push(value);
    }
    payload.push(b']');
    core.push_frame(encode::serial_write(SW_SERIAL0, &payload));
    Ok(())
}
