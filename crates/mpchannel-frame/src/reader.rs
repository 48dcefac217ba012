use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{decode_frame, is_end_marker, is_start_marker};
use crate::error::Result;
use crate::message::Message;

/// Default number of bytes requested from the stream per read call.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Longest line kept in the buffer before it is discarded as garbage.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Largest frame body kept while waiting for its end marker.
///
/// Counts every body line plus its newline.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Outcome of a single non-fatal read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent<T> {
    /// A complete item was read.
    Item(T),
    /// The stream has nothing to deliver right now.
    WouldBlock,
    /// The stream reported end-of-file.
    Eof,
}

/// Splits a byte stream into lines.
///
/// Bytes are read in fixed-size chunks and buffered until a newline shows
/// up, so a line may arrive across any number of reads. The newline itself
/// is not part of the returned line.
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    chunk: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(chunk_size.max(1)),
            chunk: vec![0u8; chunk_size.max(1)],
        }
    }

    /// Return the next buffered line, reading from the stream as needed.
    ///
    /// `WouldBlock` and end-of-file are reported as events; only other I/O
    /// errors are returned as `Err`. Bytes of an unfinished line stay
    /// buffered across calls.
    pub fn next_line(&mut self) -> Result<ReadEvent<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadEvent::Item(line));
            }

            if self.buf.len() > MAX_LINE_LEN {
                warn!(len = self.buf.len(), "discarding overlong line");
                self.buf.clear();
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadEvent::WouldBlock)
                }
                Err(err) => return Err(err.into()),
            };

            if read == 0 {
                return Ok(ReadEvent::Eof);
            }

            self.buf.extend_from_slice(&self.chunk[..read]);
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|b| *b == b'\n')?;
        let line = self.buf.split_to(newline);
        self.buf.advance(1);
        let text = String::from_utf8_lossy(&line).into_owned();
        trace!(line = %text.trim_end(), "read line");
        Some(text)
    }

    /// Bytes received but not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop the bytes of an unfinished line. Returns how many were dropped.
    pub fn discard_partial(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Reads complete messages from a line stream.
///
/// Lines outside a frame are skipped until a start marker appears. Frames
/// that fail to decode are dropped and scanning resumes at the next start
/// marker. A start marker seen inside an open frame restarts the frame, so
/// a truncated frame never swallows the one after it.
pub struct FrameReader<R> {
    lines: LineReader<R>,
    pending: Option<Vec<String>>,
    pending_len: usize,
    max_frame_len: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::from_lines(LineReader::new(inner))
    }

    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        Self::from_lines(LineReader::with_chunk_size(inner, chunk_size))
    }

    pub fn from_lines(lines: LineReader<R>) -> Self {
        Self {
            lines,
            pending: None,
            pending_len: 0,
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    pub fn set_max_frame_len(&mut self, max_frame_len: usize) {
        self.max_frame_len = max_frame_len;
    }

    /// Read until a message is decoded or the stream runs dry.
    ///
    /// A partially received frame is kept across `WouldBlock` and `Eof`
    /// events and completed by later calls.
    pub fn next_message(&mut self) -> Result<ReadEvent<Message>> {
        loop {
            let line = match self.lines.next_line()? {
                ReadEvent::Item(line) => line,
                ReadEvent::WouldBlock => return Ok(ReadEvent::WouldBlock),
                ReadEvent::Eof => return Ok(ReadEvent::Eof),
            };

            if let Some(message) = self.accept_line(line) {
                return Ok(ReadEvent::Item(message));
            }
        }
    }

    fn accept_line(&mut self, line: String) -> Option<Message> {
        if self.pending.is_none() {
            if is_start_marker(&line) {
                self.pending = Some(Vec::with_capacity(2));
                self.pending_len = 0;
            } else {
                trace!("skipping line outside of a frame");
            }
            return None;
        }
        let body = self.pending.get_or_insert_with(Vec::new);

        if is_start_marker(&line) {
            debug!(lines = body.len(), "start marker inside open frame, restarting frame");
            body.clear();
            self.pending_len = 0;
            return None;
        }

        if !is_end_marker(&line) {
            let len = self.pending_len + line.len() + 1;
            if len > self.max_frame_len {
                debug!(len, max = self.max_frame_len, "dropping oversized frame");
                self.reset();
                return None;
            }
            body.push(line);
            self.pending_len = len;
            return None;
        }

        let body = self.pending.take().unwrap_or_default();
        self.pending_len = 0;
        match decode_frame(&body) {
            Ok(message) => {
                debug!(%message, "frame decoded");
                Some(message)
            }
            Err(err) => {
                debug!(error = %err, "dropping frame");
                None
            }
        }
    }

    /// Whether a start marker has been seen without its end marker.
    pub fn in_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget any partially received frame.
    pub fn reset(&mut self) {
        self.pending = None;
        self.pending_len = 0;
    }

    /// Forget the open frame and any unfinished line.
    ///
    /// For streams where end-of-file means no writer can finish them.
    /// Returns the number of raw bytes dropped.
    pub fn discard_partial(&mut self) -> usize {
        self.reset();
        self.lines.discard_partial()
    }

    pub fn get_ref(&self) -> &R {
        self.lines.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.lines.get_mut()
    }

    pub fn into_inner(self) -> R {
        self.lines.into_inner()
    }
}
