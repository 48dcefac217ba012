//! Power command channel between a controller and a machine-local worker.
//!
//! A controller asks the worker on the same machine to shut down, reboot
//! or sleep. Commands travel as marker-delimited frames over a FIFO on
//! Unix or a named pipe on Windows; the worker reads them and hands each
//! one to a power executor.
//!
//! # Crate Structure
//!
//! - [`frame`] — Message types and the line-oriented frame codec
//! - [`transport`] — FIFO and named-pipe transports behind one trait
//! - [`worker`] — Dispatch loop, executors and the controller facade (behind `worker` feature)

/// Re-export frame types.
pub mod frame {
    pub use mpchannel_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use mpchannel_transport::*;
}

/// Re-export worker types (requires `worker` feature).
#[cfg(feature = "worker")]
pub mod worker {
    pub use mpchannel_worker::*;
}
