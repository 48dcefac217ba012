use mpchannel_frame::MessageKind;

/// Errors from carrying out a power command.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The command ran and reported failure.
    #[error("`{command}` exited with {status}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
    },

    /// A power system call failed.
    #[error("{call} failed: {source}")]
    Native {
        call: &'static str,
        source: std::io::Error,
    },

    /// No command is known for this action on the current platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(MessageKind),
}

/// Errors that can occur while running the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The channel endpoint could not be set up.
    #[error("transport error: {0}")]
    Transport(#[from] mpchannel_transport::TransportError),

    /// `run` was called on a loop that already stopped.
    #[error("dispatch loop has already stopped")]
    AlreadyStopped,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
