//! On-disk record framing (§4.A).
//!
//! Every record is a self-describing, backwards-parseable run of bytes: a
//! fixed 6-byte prefix, a variable-length name and text, and a trailing
//! 2-byte marker that lets [`crate::scanner`] walk the log tail-to-head
//! without a separate index of record boundaries.

use crate::error::{CodecError, MarkerMismatchSnafu, NameTooLongSnafu, TextTooLongSnafu,
    TruncatedSnafu};

const HEADER_LEN: usize = 6; // time(4) + kind(1) + name_len(1)
const TEXT_LEN_LEN: usize = 2;
const MARKER_LEN: usize = 2;
const FIXED_LEN: usize = HEADER_LEN + TEXT_LEN_LEN + MARKER_LEN; // 10

pub const MAX_NAME_LEN: usize = u8::MAX as usize;
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

/// The kind of a chat record.
///
/// The wire format stores this as a single byte. Values 0–6 are the kinds the
/// format defines; any other byte value round-trips losslessly as
/// [`MessageKind::Other`] rather than being rejected, so a reader never
/// chokes on a byte a newer writer produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Message,
    Action,
    Ad,
    Roll,
    Warn,
    Event,
    Broadcast,
    Other(u8),
}

impl MessageKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            MessageKind::Message => 0,
            MessageKind::Action => 1,
            MessageKind::Ad => 2,
            MessageKind::Roll => 3,
            MessageKind::Warn => 4,
            MessageKind::Event => 5,
            MessageKind::Broadcast => 6,
            MessageKind::Other(b) => b,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => MessageKind::Message,
            1 => MessageKind::Action,
            2 => MessageKind::Ad,
            3 => MessageKind::Roll,
            4 => MessageKind::Warn,
            5 => MessageKind::Event,
            6 => MessageKind::Broadcast,
            other => MessageKind::Other(other),
        }
    }

    /// Whether records of this kind carry no sender (§4.A: `Event` records are
    /// always encoded with an empty name, regardless of the runtime value).
    fn suppresses_sender(self) -> bool {
        matches!(self, MessageKind::Event)
    }
}

/// A single chat message, decoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Seconds-resolution wall-clock instant, interpreted in local time.
    pub time: u32,
    pub kind: MessageKind,
    pub sender_name: String,
    pub text: String,
}

impl Record {
    /// Encodes this record per the layout in spec §4.A, returning the
    /// encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NameTooLong`] or [`CodecError::TextTooLong`] if
    /// either field exceeds its on-disk length cap.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let name = if self.kind.suppresses_sender() {
            ""
        } else {
            self.sender_name.as_str()
        };
        let name_bytes = name.as_bytes();
        let text_bytes = self.text.as_bytes();

        snafu::ensure!(
            name_bytes.len() <= MAX_NAME_LEN,
            NameTooLongSnafu {
                len: name_bytes.len()
            }
        );
        snafu::ensure!(
            text_bytes.len() <= MAX_TEXT_LEN,
            TextTooLongSnafu {
                len: text_bytes.len()
            }
        );

        let total = FIXED_LEN + name_bytes.len() + text_bytes.len();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.push(self.kind.to_byte());
        buf.push(name_bytes.len() as u8);
        buf.extend_from_slice(name_bytes);
        buf.extend_from_slice(&(text_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(text_bytes);
        buf.extend_from_slice(&((total - MARKER_LEN) as u16).to_le_bytes());
        Ok(buf)
    }

    /// Decodes a record starting at `offset` in `buf`, validating the
    /// trailing size marker.
    ///
    /// Returns the decoded record and the number of bytes consumed.
    pub fn decode_forward(buf: &[u8], offset: usize) -> Result<(Record, usize), CodecError> {
        snafu::ensure!(
            buf.len() >= offset + HEADER_LEN,
            TruncatedSnafu {
                need: offset + HEADER_LEN,
                have: buf.len()
            }
        );

        let time = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        let kind = MessageKind::from_byte(buf[offset + 4]);
        let name_len = buf[offset + 5] as usize;
        let mut pos = offset + HEADER_LEN;

        snafu::ensure!(
            buf.len() >= pos + name_len + TEXT_LEN_LEN,
            TruncatedSnafu {
                need: pos + name_len + TEXT_LEN_LEN,
                have: buf.len()
            }
        );
        let sender_name = std::str::from_utf8(&buf[pos..pos + name_len])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();
        pos += name_len;

        let text_len = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
        pos += TEXT_LEN_LEN;

        snafu::ensure!(
            buf.len() >= pos + text_len + MARKER_LEN,
            TruncatedSnafu {
                need: pos + text_len + MARKER_LEN,
                have: buf.len()
            }
        );
        let text = std::str::from_utf8(&buf[pos..pos + text_len])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();
        pos += text_len;

        let marker = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
        let parsed = pos - offset;
        pos += MARKER_LEN;
        snafu::ensure!(marker == parsed, MarkerMismatchSnafu { marker, parsed });

        Ok((
            Record {
                time,
                kind,
                sender_name,
                text,
            },
            pos - offset,
        ))
    }

    /// Decodes the record occupying the bytes immediately preceding
    /// `boundary` in `buf`, using the trailing marker to find the start.
    ///
    /// Returns the decoded record and its start offset within `buf`.
    pub fn decode_tail(buf: &[u8], boundary: usize) -> Result<(Record, usize), CodecError> {
        snafu::ensure!(
            boundary >= MARKER_LEN,
            TruncatedSnafu {
                need: MARKER_LEN,
                have: boundary
            }
        );
        let marker = u16::from_le_bytes(
            buf[boundary - MARKER_LEN..boundary]
                .try_into()
                .unwrap(),
        ) as usize;
        let total = marker + MARKER_LEN;
        snafu::ensure!(
            boundary >= total,
            TruncatedSnafu {
                need: total,
                have: boundary
            }
        );
        let start = boundary - total;
        let (record, consumed) = Self::decode_forward(buf, start)?;
        snafu::ensure!(
            consumed == total,
            MarkerMismatchSnafu {
                marker,
                parsed: consumed.saturating_sub(MARKER_LEN)
            }
        );
        Ok((record, start))
    }
}

/// Reads just the trailing size marker at `boundary`, without decoding the
/// rest of the record. Used by the reverse scanner to find record
/// boundaries cheaply before paying for a full decode.
pub fn read_marker(buf: &[u8], boundary: usize) -> Option<usize> {
    if boundary < MARKER_LEN {
        return None;
    }
    let marker =
        u16::from_le_bytes(buf[boundary - MARKER_LEN..boundary].try_into().unwrap()) as usize;
    Some(marker + MARKER_LEN)
}
