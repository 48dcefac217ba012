//! Transports for the controller → worker channel.
//!
//! Provides one interface over two local transport mechanisms:
//! - FIFO special files (Linux/macOS)
//! - Named pipes (Windows)
//!
//! The worker is always the server and only reads; the controller is the
//! client and only writes. Neither side reports failures to its caller:
//! a transport that cannot reach its peer is simply not ready.

pub mod config;
pub mod error;
pub mod factory;
pub mod pipe;
pub mod queue;
pub mod traits;

#[cfg(unix)]
pub mod fifo;

pub use config::{default_path, ChannelConfig};
pub use error::{Result, TransportError};
pub use factory::open_transport;
pub use queue::PendingQueue;
pub use traits::{Role, Transport, TransportState};

#[cfg(unix)]
pub use fifo::FifoTransport;

#[cfg(windows)]
pub use pipe::{NamedPipeClient, NamedPipeServer};

pub use pipe::{PipeAcceptor, PipeServer};
