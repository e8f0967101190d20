//! Error types for mpytransfer.

use std::io;
use thiserror::Error;

/// Result type for mpytransfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mpytransfer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device did not answer within the allowed time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The device rejected a frame header or did not get the frame in time (`#2`).
    #[error(
        "Device didn't receive next message in time or message header corrupt.\n\nLast message was:\n{chunk}"
    )]
    HeaderRejected {
        /// Raw chunk of the rejected frame, lossily decoded.
        chunk: String,
    },

    /// The device received fewer payload bytes than the header declared (`#3`).
    #[error(
        "Device didn't receive as much data as was indicated in the message header.\n\nLast message was:\n{chunk}"
    )]
    IncompleteChunk {
        /// Raw chunk of the truncated frame, lossily decoded.
        chunk: String,
    },

    /// The device answered a data frame with something other than an acknowledgment.
    #[error("Protocol error: expected {expected} but device replied with: {reply}\n\nLast message was:\n{chunk}")]
    UnexpectedAck {
        /// Acknowledgment the host was waiting for.
        expected: &'static str,
        /// Raw reply, lossily decoded.
        reply: String,
        /// Raw chunk of the frame, lossily decoded.
        chunk: String,
    },

    /// The terminator frame was not answered with the overall success code.
    #[error("Transfer failed: expected #0 but device replied with: {reply}")]
    TransferFailed {
        /// Raw reply, lossily decoded.
        reply: String,
    },

    /// An operation was attempted after the session was closed.
    #[error("Session is not active")]
    InactiveSession,

    /// A path or name cannot be used as a file name on the device.
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Control characters are addressed by a letter `a` to `z`.
    #[error("Invalid control character: {0:?}")]
    InvalidControlCharacter(char),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error means the link or device stopped answering.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the device answered, but not in the way the protocol expects.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::HeaderRejected { .. }
                | Self::IncompleteChunk { .. }
                | Self::UnexpectedAck { .. }
                | Self::TransferFailed { .. }
        )
    }
}
