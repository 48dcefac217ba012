//! Marker-delimited message envelope for the controller → worker channel.
//!
//! Every power command travels as one line-oriented frame:
//! - a start marker line (`-->`)
//! - the registered type name of the message
//! - the JSON object holding the message fields
//! - an end marker line (`<--`)
//!
//! Frames carry no length prefix. Readers resynchronize on the next start
//! marker whenever a frame cannot be decoded.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_message, encode_to_vec, END_MARKER, START_MARKER};
pub use error::{FrameError, Result};
pub use message::{lookup, registered_names, Decoder, Message, MessageKind};
pub use reader::{FrameReader, LineReader, ReadEvent, DEFAULT_CHUNK_SIZE, MAX_FRAME_LEN};
pub use writer::FrameWriter;
