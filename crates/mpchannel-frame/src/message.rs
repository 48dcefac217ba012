use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// The power action a message asks the worker to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Shutdown,
    Reboot,
    Sleep,
}

impl MessageKind {
    /// Every registered kind, in registry order.
    pub const ALL: [MessageKind; 3] = [MessageKind::Shutdown, MessageKind::Reboot, MessageKind::Sleep];

    /// The type name written on the wire for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            MessageKind::Shutdown => "ShutdownMessage",
            MessageKind::Reboot => "RebootMessage",
            MessageKind::Sleep => "SleepMessage",
        }
    }

    /// Lower-case action name used in logs and on the command line.
    pub fn action(self) -> &'static str {
        match self {
            MessageKind::Shutdown => "shutdown",
            MessageKind::Reboot => "reboot",
            MessageKind::Sleep => "sleep",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// A power command sent from the controller to the worker.
///
/// `timeout` is the number of seconds the worker waits before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    Shutdown { timeout: u64 },
    Reboot { timeout: u64 },
    Sleep { timeout: u64 },
}

impl Message {
    /// Build a message of the given kind.
    pub fn new(kind: MessageKind, timeout: u64) -> Self {
        match kind {
            MessageKind::Shutdown => Message::Shutdown { timeout },
            MessageKind::Reboot => Message::Reboot { timeout },
            MessageKind::Sleep => Message::Sleep { timeout },
        }
    }

    pub fn shutdown(timeout: u64) -> Self {
        Message::Shutdown { timeout }
    }

    pub fn reboot(timeout: u64) -> Self {
        Message::Reboot { timeout }
    }

    pub fn sleep(timeout: u64) -> Self {
        Message::Sleep { timeout }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Shutdown { .. } => MessageKind::Shutdown,
            Message::Reboot { .. } => MessageKind::Reboot,
            Message::Sleep { .. } => MessageKind::Sleep,
        }
    }

    pub fn timeout(&self) -> u64 {
        match *self {
            Message::Shutdown { timeout }
            | Message::Reboot { timeout }
            | Message::Sleep { timeout } => timeout,
        }
    }

    /// The registered wire type name.
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    pub(crate) fn fields(&self) -> TimeoutFields {
        TimeoutFields {
            timeout: self.timeout(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(timeout={})", self.kind(), self.timeout())
    }
}

/// JSON body shared by every registered message.
///
/// Unknown keys are ignored; a missing `timeout` defaults to zero.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TimeoutFields {
    #[serde(default)]
    pub timeout: u64,
}

/// Builds a message from the concatenated payload lines of a frame.
pub type Decoder = fn(&str) -> Result<Message>;

static REGISTRY: [(&str, Decoder); 3] = [
    ("ShutdownMessage", decode_shutdown),
    ("RebootMessage", decode_reboot),
    ("SleepMessage", decode_sleep),
];

/// Look up the decoder registered for a wire type name.
pub fn lookup(type_name: &str) -> Option<Decoder> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, decoder)| *decoder)
}

/// Registered wire type names.
pub fn registered_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

fn decode_shutdown(payload: &str) -> Result<Message> {
    parse_fields(payload).map(|fields| Message::shutdown(fields.timeout))
}

fn decode_reboot(payload: &str) -> Result<Message> {
    parse_fields(payload).map(|fields| Message::reboot(fields.timeout))
}

fn decode_sleep(payload: &str) -> Result<Message> {
    parse_fields(payload).map(|fields| Message::sleep(fields.timeout))
}

fn parse_fields(payload: &str) -> Result<TimeoutFields> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    if !value.is_object() {
        return Err(FrameError::Malformed("payload is not a json object"));
    }
    Ok(serde_json::from_value(value)?)
}
