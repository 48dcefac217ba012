use std::path::{Path, PathBuf};
use std::time::Duration;

/// FIFO path used on Unix when none is configured.
pub const DEFAULT_FIFO_PATH: &str = "/var/run/mpworker.pipe";

/// Named pipe used on Windows when none is configured.
pub const DEFAULT_PIPE_NAME: &str = r"\\.\pipe\mpserver";

/// FIFO permission bits: the worker reads, everyone else may write.
pub const DEFAULT_FIFO_MODE: u32 = 0o622;

/// Interval between polls of an idle channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the shared queue and client list locks.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Named pipe in/out buffer size.
pub const DEFAULT_PIPE_BUFFER_SIZE: u32 = 64 * 1024;

/// The platform's default channel address.
pub fn default_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(DEFAULT_PIPE_NAME)
    } else {
        PathBuf::from(DEFAULT_FIFO_PATH)
    }
}

/// Configuration shared by both channel transports.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// FIFO path (Unix) or pipe name (Windows).
    pub path: PathBuf,
    /// Backoff between reads of an idle channel and between accept retries.
    pub poll_interval: Duration,
    /// Bounded wait for the pending queue and client list locks.
    pub lock_timeout: Duration,
    /// Permission bits for a newly created FIFO.
    pub fifo_mode: u32,
    /// Bytes requested per read from a connected pipe client.
    pub read_chunk_size: usize,
    /// Named pipe in/out buffer size.
    pub pipe_buffer_size: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            fifo_mode: DEFAULT_FIFO_MODE,
            read_chunk_size: mpchannel_frame::DEFAULT_CHUNK_SIZE,
            pipe_buffer_size: DEFAULT_PIPE_BUFFER_SIZE,
        }
    }
}

impl ChannelConfig {
    /// Default configuration addressing `path`.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self::default().with_path(path)
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_fifo_mode(mut self, mode: u32) -> Self {
        self.fifo_mode = mode;
        self
    }
}
