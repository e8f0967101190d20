//! Receiving side of the chunked protocol.
//!
//! This is the state machine the device script runs, expressed byte by byte so
//! it can be driven without a clock: bytes go in through [`FrameReceiver::feed`],
//! a read deadline passing is reported with [`FrameReceiver::expire`], and the
//! acknowledgments to send back queue up until [`FrameReceiver::take_replies`].

use crate::protocol::frame::{Ack, HEADER_LEN, decode_payload, parse_header};
use log::trace;

#[derive(Debug)]
enum State {
    Header(Vec<u8>),
    Payload { expected: usize, buf: Vec<u8> },
    Finished { success: bool },
}

/// Reassembles a file from data frames.
#[derive(Debug)]
pub struct FrameReceiver {
    state: State,
    output: Vec<u8>,
    replies: Vec<Ack>,
    frames: usize,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    /// Create a receiver waiting for the first header.
    pub fn new() -> Self {
        Self {
            state: State::Header(Vec::with_capacity(HEADER_LEN)),
            output: Vec::new(),
            replies: Vec::new(),
            frames: 0,
        }
    }

    /// Consume one byte from the link.
    ///
    /// Returns `false` once the receiver has finished; the byte is then left
    /// for whoever reads the link next.
    pub fn feed(&mut self, byte: u8) -> bool {
        match &mut self.state {
            State::Finished { .. } => return false,
            State::Header(buf) => {
                buf.push(byte);
                if buf.len() < HEADER_LEN {
                    return true;
                }
                self.frames += 1;
                match parse_header(buf) {
                    None => {
                        trace!("Malformed header {buf:?}");
                        self.replies
                            .push(Ack::HeaderRejected);
                        self.finish(false);
                    },
                    Some(0) => self.finish(true),
                    Some(expected) => {
                        self.state = State::Payload {
                            expected,
                            buf: Vec::with_capacity(expected),
                        };
                    },
                }
            },
            State::Payload { expected, buf } => {
                buf.push(byte);
                if buf.len() < *expected {
                    return true;
                }
                match decode_payload(buf) {
                    Some(decoded) => {
                        self.output
                            .extend_from_slice(&decoded);
                        self.replies
                            .push(Ack::ChunkAccepted);
                        self.state = State::Header(Vec::with_capacity(HEADER_LEN));
                    },
                    None => self.finish(false),
                }
            },
        }
        true
    }

    /// Report that the current read did not complete in time.
    pub fn expire(&mut self) {
        match self.state {
            State::Finished { .. } => {},
            State::Header(_) => {
                self.replies
                    .push(Ack::HeaderRejected);
                self.finish(false);
            },
            State::Payload { .. } => {
                self.replies
                    .push(Ack::IncompleteChunk);
                self.finish(false);
            },
        }
    }

    fn finish(&mut self, success: bool) {
        self.replies
            .push(if success { Ack::Success } else { Ack::Failure });
        self.state = State::Finished { success };
    }

    /// Take the acknowledgments produced since the last call.
    pub fn take_replies(&mut self) -> Vec<Ack> {
        std::mem::take(&mut self.replies)
    }

    /// Whether the final acknowledgment has been produced.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished { .. })
    }

    /// `Some(true)` after a clean terminator, `Some(false)` after an abort.
    pub fn outcome(&self) -> Option<bool> {
        match self.state {
            State::Finished { success } => Some(success),
            _ => None,
        }
    }

    /// Number of frame headers seen, terminator included.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Bytes written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Consume the receiver and return the reassembled bytes.
    pub fn into_output(self) -> Vec<u8> {
        self.output
    }
}
