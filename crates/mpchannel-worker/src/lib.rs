//! Worker side of the power command channel.
//!
//! The worker owns the server end of the channel and runs a
//! [`DispatchLoop`] that hands each received command to a
//! [`PowerExecutor`]. Controllers talk to it through [`Connectivity`].

pub mod connectivity;
pub mod dispatch;
pub mod error;
pub mod executor;

#[cfg(test)]
mod testing;

pub use connectivity::{Connectivity, TransportConnectivity};
pub use dispatch::{DispatchLoop, LoopState, StopHandle};
pub use error::{ExecutorError, Result, WorkerError};
pub use executor::{
    linux_command, macos_command, platform_command, windows_command, CommandExecutor,
    CommandPlanner, LoggingExecutor, PowerCommand, PowerExecutor,
};
