//! Port abstraction for the serial link to the board.
//!
//! The protocol layers only ever need four things from the link: write bytes,
//! read whatever is available without blocking, read an exact count within a
//! deadline (built on the former, see [`timed`]) and toggle the two modem
//! control lines used to reset the board. [`Port`] captures exactly that, so
//! the session can run against real hardware ([`NativePort`]) or against a
//! simulated board in tests.
//!
//! ```text
//! +------------------+
//! |     Session      |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+     +------------------+
//! | repl / protocol  | --> |  port::timed     |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +--------+------------------------+---------+
//! |                Port trait                 |
//! +--------+------------------------+---------+
//!          |                        |
//!          v                        v
//! +--------+---------+     +--------+---------+
//! | NativePort       |     | SimulatedBoard   |
//! |  (serialport)    |     |   (tests)        |
//! +------------------+     +------------------+
//! ```
//!
//! ## Read semantics
//!
//! `Read::read` on a port must not block for long: when nothing is buffered it
//! returns `Ok(0)` or an error of kind `TimedOut`/`WouldBlock`. Bounded waits
//! are the caller's job.

#[cfg(feature = "native")]
pub mod native;
pub mod timed;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default baud rate of the MicroPython REPL.
pub const DEFAULT_BAUD: u32 = 115200;

/// Default write timeout; a write that cannot complete within it fails.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// Serial port configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Bound on a single write.
    pub write_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Serial link capabilities used by the transfer protocol.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Set DTR (Data Terminal Ready) pin state.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Set RTS (Request To Send) pin state.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;
}

#[cfg(feature = "native")]
pub use native::NativePort;
