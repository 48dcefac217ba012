use std::io;

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::message::{lookup, Message};

/// Line that opens a frame.
pub const START_MARKER: &str = "-->";

/// Line that closes a frame.
pub const END_MARKER: &str = "<--";

/// Encode a message into the wire format.
///
/// Wire format (every line newline-terminated):
/// ```text
/// -->
/// ShutdownMessage
/// {"timeout": 5}
/// <--
/// ```
///
/// The JSON body is always written on a single line.
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    let payload = serialize_fields(message)?;
    let type_name = message.type_name();

    dst.reserve(START_MARKER.len() + type_name.len() + payload.len() + END_MARKER.len() + 4);
    put_line(dst, START_MARKER.as_bytes());
    put_line(dst, type_name.as_bytes());
    put_line(dst, &payload);
    put_line(dst, END_MARKER.as_bytes());
    Ok(())
}

/// Encode a message into a freshly allocated buffer.
pub fn encode_to_vec(message: &Message) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    encode_message(message, &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode the lines found strictly between a start and an end marker.
///
/// The first line is the registered type name; the remaining lines are
/// joined and parsed as the JSON payload.
pub fn decode_frame<S: AsRef<str>>(lines: &[S]) -> Result<Message> {
    let (type_line, payload_lines) = match lines {
        [type_line, payload @ ..] if !payload.is_empty() => (type_line, payload),
        _ => {
            return Err(FrameError::Malformed(
                "expected a type name and a payload between markers",
            ))
        }
    };

    let type_name = type_line.as_ref().trim();
    let decoder =
        lookup(type_name).ok_or_else(|| FrameError::UnknownMessageType(type_name.to_string()))?;

    let payload = payload_lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    decoder(&payload)
}

pub(crate) fn is_start_marker(line: &str) -> bool {
    line.trim() == START_MARKER
}

pub(crate) fn is_end_marker(line: &str) -> bool {
    line.trim() == END_MARKER
}

fn put_line(dst: &mut BytesMut, line: &[u8]) {
    dst.put_slice(line);
    dst.put_u8(b'\n');
}

fn serialize_fields(message: &Message) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(32);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    message.fields().serialize(&mut serializer)?;
    Ok(out)
}

/// Compact single-line JSON with a space after `,` and `:`.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[test]
    fn encodes_exact_shutdown_frame() {
        let wire = encode_to_vec(&Message::shutdown(5)).unwrap();
        assert_eq!(wire, b"-->\nShutdownMessage\n{\"timeout\": 5}\n<--\n");
    }

    #[test]
    fn decodes_exact_shutdown_frame() {
        let message = decode_frame(&["ShutdownMessage", "{\"timeout\": 5}"]).unwrap();
        assert_eq!(message, Message::shutdown(5));
    }

    #[test]
    fn roundtrip_every_kind() {
        for kind in MessageKind::ALL {
            for timeout in [0, 1, 59, 3600, u64::MAX] {
                let message = Message::new(kind, timeout);
                let wire = String::from_utf8(encode_to_vec(&message).unwrap()).unwrap();
                let lines: Vec<&str> = wire.lines().collect();
                assert_eq!(lines.first(), Some(&START_MARKER));
                assert_eq!(lines.last(), Some(&END_MARKER));
                let decoded = decode_frame(&lines[1..lines.len() - 1]).unwrap();
                assert_eq!(decoded, message);
            }
        }
    }

    #[test]
    fn payload_may_span_lines() {
        let message = decode_frame(&["RebootMessage", "{", "  \"timeout\": 30", "}"]).unwrap();
        assert_eq!(message, Message::reboot(30));
    }

    #[test]
    fn type_name_is_trimmed() {
        let message = decode_frame(&["  SleepMessage \r", "{}"]).unwrap();
        assert_eq!(message, Message::sleep(0));
    }

    #[test]
    fn too_few_lines_is_malformed() {
        let empty: [&str; 0] = [];
        assert!(matches!(decode_frame(&empty), Err(FrameError::Malformed(_))));
        assert!(matches!(
            decode_frame(&["ShutdownMessage"]),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = decode_frame(&["FormatDiskMessage", "{}"]).unwrap_err();
        assert!(matches!(err, FrameError::UnknownMessageType(name) if name == "FormatDiskMessage"));
    }

    #[test]
    fn invalid_json_is_dropped_frame() {
        let err = decode_frame(&["ShutdownMessage", "{\"timeout\": "]).unwrap_err();
        assert!(err.is_dropped_frame());
    }

    #[test]
    fn markers_tolerate_surrounding_whitespace() {
        assert!(is_start_marker("-->\r\n"));
        assert!(is_end_marker(" <-- "));
        assert!(!is_start_marker("--> x"));
    }
}
