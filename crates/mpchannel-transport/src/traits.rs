use std::fmt;
use std::sync::Arc;

use mpchannel_frame::Message;

/// Which end of the channel a transport serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The worker end: creates the channel and reads commands.
    Server,
    /// The controller end: opens the channel and writes commands.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// Lifecycle of a transport endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Ready,
}

/// One end of the controller → worker channel.
///
/// Every method is infallible from the caller's point of view: failures are
/// logged and degrade to "nothing happened this time". Methods take `&self`
/// so the dispatch thread and a stop handler can share one transport.
pub trait Transport: Send + Sync {
    fn role(&self) -> Role;

    fn state(&self) -> TransportState;

    fn is_ready(&self) -> bool {
        self.state() == TransportState::Ready
    }

    /// Try to bring the endpoint up. A missing peer is not an error.
    fn connect(&self);

    /// Tear the endpoint down. Calling it again is a no-op.
    fn disconnect(&self);

    /// Next received message, or `None` when nothing can be delivered now.
    fn read(&self) -> Option<Message>;

    /// Send a message. Undeliverable messages are dropped.
    fn write(&self, message: &Message);

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn role(&self) -> Role {
        (**self).role()
    }

    fn state(&self) -> TransportState {
        (**self).state()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn connect(&self) {
        (**self).connect()
    }

    fn disconnect(&self) {
        (**self).disconnect()
    }

    fn read(&self) -> Option<Message> {
        (**self).read()
    }

    fn write(&self, message: &Message) {
        (**self).write(message)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn role(&self) -> Role {
        (**self).role()
    }

    fn state(&self) -> TransportState {
        (**self).state()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn connect(&self) {
        (**self).connect()
    }

    fn disconnect(&self) {
        (**self).disconnect()
    }

    fn read(&self) -> Option<Message> {
        (**self).read()
    }

    fn write(&self, message: &Message) {
        (**self).write(message)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
