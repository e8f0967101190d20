//! Host side of the chunked transfer protocol.
//!
//! The data is cut into fixed-size chunks, each sent as one base64 frame and
//! answered by the receiver before the next one goes out:
//!
//! ```text
//! host                         device
//!  | -- #64<64 bytes base64> --> |
//!  | <----------- #1 ----------- |
//!  | -- #04<4 bytes base64> ---> |
//!  | <----------- #1 ----------- |
//!  | ---------- #00 -----------> |
//!  | <----------- #0 ----------- |
//! ```
//!
//! There are no sequence numbers and no retransmissions: the first bad
//! acknowledgment aborts the transfer.

use crate::error::{Error, Result};
use crate::port::timed::{DEFAULT_POLL_INTERVAL, read_exact_timeout};
use crate::protocol::frame::{
    ACK_LEN, Ack, DEFAULT_CHUNK_SIZE, Frame, MAX_CHUNK_SIZE, chunk_count,
};
use log::{debug, trace};
use std::io::{Read, Write};
use std::time::Duration;

/// Default time the receiver gets to acknowledge a frame.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Chunked transfer configuration options.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferConfig {
    /// Raw bytes per data frame.
    pub chunk_size: usize,
    /// Timeout for each acknowledgment.
    pub ack_timeout: Duration,
    /// Interval between polls while waiting for an acknowledgment.
    pub poll_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TransferConfig {
    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the acknowledgment timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Check that every frame header can express the encoded chunk length.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "chunk size must be between 1 and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Chunked transfer handler.
pub struct ChunkedTransfer<'a, P: Read + Write + ?Sized> {
    port: &'a mut P,
    config: TransferConfig,
}

impl<'a, P: Read + Write + ?Sized> ChunkedTransfer<'a, P> {
    /// Create a new transfer handler.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: TransferConfig::default(),
        }
    }

    /// Create a new transfer handler with custom configuration.
    pub fn with_config(port: &'a mut P, config: TransferConfig) -> Self {
        Self { port, config }
    }

    fn read_ack(&mut self) -> Result<Option<Vec<u8>>> {
        read_exact_timeout(
            &mut *self.port,
            ACK_LEN,
            self.config.ack_timeout,
            self.config.poll_interval,
        )
    }

    fn no_answer(&self) -> Error {
        Error::Timeout(format!(
            "Device failed to respond within {} ms",
            self.config.ack_timeout.as_millis()
        ))
    }

    /// Send one data frame and check its acknowledgment.
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let frame = Frame::data(chunk).build();
        trace!("Sending frame ({} bytes)", frame.len());

        self.port.write_all(&frame)?;
        self.port.flush()?;

        let Some(reply) = self.read_ack()? else {
            return Err(self.no_answer());
        };

        let last = || String::from_utf8_lossy(chunk).into_owned();
        match Ack::from_reply(&reply) {
            Some(Ack::ChunkAccepted) => Ok(()),
            Some(Ack::HeaderRejected) => Err(Error::HeaderRejected { chunk: last() }),
            Some(Ack::IncompleteChunk) => Err(Error::IncompleteChunk { chunk: last() }),
            _ => Err(Error::UnexpectedAck {
                expected: "#1",
                reply: String::from_utf8_lossy(&reply).into_owned(),
                chunk: last(),
            }),
        }
    }

    /// Send the terminator frame and check the overall result.
    fn send_terminator(&mut self) -> Result<()> {
        self.port
            .write_all(&Frame::Terminator.build())?;
        self.port.flush()?;

        let Some(reply) = self.read_ack()? else {
            return Err(self.no_answer());
        };

        match Ack::from_reply(&reply) {
            Some(Ack::Success) => Ok(()),
            _ => Err(Error::TransferFailed {
                reply: String::from_utf8_lossy(&reply).into_owned(),
            }),
        }
    }

    /// Transfer file data.
    ///
    /// # Arguments
    ///
    /// * `data` - File contents; may be empty
    /// * `progress` - Called after every accepted chunk with (sent, total)
    pub fn send_file<F>(&mut self, data: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.config.validate()?;

        let total = data.len();
        debug!(
            "Starting chunked transfer: {} bytes in {} frames",
            total,
            chunk_count(total, self.config.chunk_size)
        );

        let mut sent = 0;
        for chunk in data.chunks(self.config.chunk_size) {
            self.send_chunk(chunk)?;
            sent += chunk.len();
            progress(sent, total);
        }

        self.send_terminator()?;

        debug!("Chunked transfer complete");
        Ok(())
    }
}
