use crate::config::ChannelConfig;
use crate::error::Result;
use crate::traits::{Role, Transport};

/// Open the platform's channel transport for `role`.
///
/// Unix uses a FIFO special file, Windows a named pipe. Only server
/// construction can fail: the endpoint has to be created. A client whose
/// worker is not up yet is returned not ready and connects on first write.
pub fn open_transport(role: Role, config: &ChannelConfig) -> Result<Box<dyn Transport>> {
    open_platform(role, config.clone())
}

#[cfg(unix)]
fn open_platform(role: Role, config: ChannelConfig) -> Result<Box<dyn Transport>> {
    use crate::fifo::FifoTransport;

    Ok(match role {
        Role::Server => Box::new(FifoTransport::server(config)?),
        Role::Client => Box::new(FifoTransport::client(config)),
    })
}

#[cfg(windows)]
fn open_platform(role: Role, config: ChannelConfig) -> Result<Box<dyn Transport>> {
    use crate::pipe::{create_server, NamedPipeClient};

    Ok(match role {
        Role::Server => Box::new(create_server(config)?),
        Role::Client => Box::new(NamedPipeClient::new(config)),
    })
}

#[cfg(not(any(unix, windows)))]
fn open_platform(_role: Role, _config: ChannelConfig) -> Result<Box<dyn Transport>> {
    Err(crate::error::TransportError::Unsupported)
}
