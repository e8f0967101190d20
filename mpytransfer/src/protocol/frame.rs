//! Frames and acknowledgments of the chunked transfer protocol.
//!
//! ## Frame Format
//!
//! ```text
//! Data frame:
//! +-----+-----------+---------------------+
//! | '#' | LEN (2)   |  base64 payload     |
//! +-----+-----------+---------------------+
//! | 1   | 2 digits  |  LEN bytes (<= 99)  |
//! +-----+-----------+---------------------+
//!
//! Terminator frame:  "#00"
//! Acknowledgment:    '#' + one digit (0..=4)
//! ```
//!
//! The payload is base64 so the raw REPL never sees bytes it would interpret
//! (Ctrl-C, Ctrl-D and friends).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Frame and acknowledgment marker byte.
pub const MARKER: u8 = b'#';

/// Length of a frame header (`#` plus two digits).
pub const HEADER_LEN: usize = 3;

/// Length of an acknowledgment.
pub const ACK_LEN: usize = 2;

/// Default raw bytes per data frame; encodes to exactly 64 bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 48;

/// Largest raw chunk whose encoding still fits two decimal digits (96 bytes).
pub const MAX_CHUNK_SIZE: usize = 72;

/// Largest payload length a header can declare.
pub const MAX_PAYLOAD_LEN: usize = 99;

/// Acknowledgment codes sent back by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ack {
    /// Whole transfer completed (answer to the terminator).
    Success = 0,
    /// Chunk decoded and written.
    ChunkAccepted = 1,
    /// Header missing, malformed or not received in time.
    HeaderRejected = 2,
    /// Fewer payload bytes than declared arrived in time.
    IncompleteChunk = 3,
    /// Transfer ended without a clean terminator.
    Failure = 4,
}

impl Ack {
    /// Parse a two-byte reply.
    pub fn from_reply(reply: &[u8]) -> Option<Self> {
        match reply {
            [MARKER, b'0'] => Some(Self::Success),
            [MARKER, b'1'] => Some(Self::ChunkAccepted),
            [MARKER, b'2'] => Some(Self::HeaderRejected),
            [MARKER, b'3'] => Some(Self::IncompleteChunk),
            [MARKER, b'4'] => Some(Self::Failure),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_bytes(self) -> [u8; ACK_LEN] {
        [MARKER, b'0' + self as u8]
    }
}

/// A frame of the chunked protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Base64 payload of one chunk.
    Data(Vec<u8>),
    /// End of file.
    Terminator,
}

impl Frame {
    /// Encode a raw chunk into a data frame.
    ///
    /// Chunks above [`MAX_CHUNK_SIZE`] do not fit the header; callers split
    /// input with a configured chunk size that is validated up front.
    pub fn data(chunk: &[u8]) -> Self {
        debug_assert!(chunk.len() <= MAX_CHUNK_SIZE);
        Self::Data(
            BASE64
                .encode(chunk)
                .into_bytes(),
        )
    }

    /// Declared payload length.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Data(payload) => payload.len(),
            Self::Terminator => 0,
        }
    }

    /// Build the frame bytes.
    pub fn build(&self) -> Vec<u8> {
        let len = self.payload_len();
        let mut frame = Vec::with_capacity(HEADER_LEN + len);
        frame.push(MARKER);
        frame.extend_from_slice(format!("{len:02}").as_bytes());
        if let Self::Data(payload) = self {
            frame.extend_from_slice(payload);
        }
        frame
    }
}

/// Parse the declared payload length from a frame header.
///
/// Returns `None` when the header is not `#` followed by two ASCII digits.
pub fn parse_header(header: &[u8]) -> Option<usize> {
    match header {
        [MARKER, tens, ones] if tens.is_ascii_digit() && ones.is_ascii_digit() => {
            Some(usize::from(tens - b'0') * 10 + usize::from(ones - b'0'))
        },
        _ => None,
    }
}

/// Decode a base64 payload.
pub fn decode_payload(payload: &[u8]) -> Option<Vec<u8>> {
    BASE64
        .decode(payload)
        .ok()
}

/// Number of data frames needed for `len` bytes.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}
