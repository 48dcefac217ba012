use mpchannel_frame::Message;
use mpchannel_transport::{open_transport, ChannelConfig, Role, Transport};
use tracing::{info, warn};

use crate::error::Result;

/// Controller-side view of the channel: ask the worker to change power state.
///
/// Each call reports whether the channel was up once the command had been
/// handed over. `false` means the command was dropped.
pub trait Connectivity {
    fn send(&self, message: &Message) -> bool;

    fn shutdown(&self, timeout: u64) -> bool {
        self.send(&Message::shutdown(timeout))
    }

    fn reboot(&self, timeout: u64) -> bool {
        self.send(&Message::reboot(timeout))
    }

    fn sleep(&self, timeout: u64) -> bool {
        self.send(&Message::sleep(timeout))
    }
}

/// [`Connectivity`] over a client-role transport.
pub struct TransportConnectivity<T> {
    transport: T,
}

impl TransportConnectivity<Box<dyn Transport>> {
    /// Open the platform's client transport described by `config`.
    pub fn open(config: &ChannelConfig) -> Result<Self> {
        Ok(Self::new(open_transport(Role::Client, config)?))
    }
}

impl<T: Transport> TransportConnectivity<T> {
    pub fn new(transport: T) -> Self {
        if transport.role() != Role::Client {
            warn!(role = %transport.role(), "connectivity expects a client transport");
        }
        Self { transport }
    }

    pub fn is_ready(&self) -> bool {
        self.transport.is_ready()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: Transport> Connectivity for TransportConnectivity<T> {
    fn send(&self, message: &Message) -> bool {
        info!(%message, transport = self.transport.transport_name(), "sending power command");
        self.transport.write(message);
        let delivered = self.transport.is_ready();
        if !delivered {
            warn!(%message, "worker is not reachable; command dropped");
        }
        delivered
    }
}
