/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame names a type that is not in the message registry.
    #[error("unknown message type {0:?}")]
    UnknownMessageType(String),

    /// The lines between the markers do not form a frame.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// The payload could not be serialized or parsed as JSON.
    #[error("frame payload json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached end-of-file.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error only affects the current frame.
    ///
    /// Dropped frames are skipped by readers; everything else ends the read.
    pub fn is_dropped_frame(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownMessageType(_) | FrameError::Malformed(_) | FrameError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
