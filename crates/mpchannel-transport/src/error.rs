use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in channel transport operations.
///
/// None of these escape the [`Transport`](crate::Transport) methods; they
/// surface from constructors and from the building blocks the transports
/// are made of, and are logged where the transport swallows them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the channel endpoint.
    #[error("failed to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open an existing channel endpoint.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A shared lock could not be acquired within the configured wait.
    #[error("timed out after {0:?} waiting for a shared lock")]
    LockTimeout(Duration),

    /// An I/O error occurred on the channel handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No transport exists for this platform.
    #[error("no channel transport is available on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, TransportError>;
