//! # mpytransfer
//!
//! A library for pushing files to MicroPython boards and running them, using
//! nothing but the board's serial REPL.
//!
//! This crate provides:
//!
//! - Reset and prompt synchronization of a board in unknown state
//! - Raw paste mode line sending with size-proportional pacing
//! - A chunked, acknowledged, base64-framed file transfer protocol
//! - A receiver program that installs itself on the board once per session
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mpytransfer::{Session, SessionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut session = Session::connect("/dev/ttyUSB0", SessionConfig::default())?;
//!
//!         // Copy a script and run it
//!         session.upload("blink.py")?;
//!         session.run_file("blink.py", None)?;
//!
//!         // Stop it again
//!         session.send_control_character('c')?;
//!
//!         // Removes the receiver from the board and closes the port
//!         session.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod port;
pub mod protocol;
pub mod repl;
pub mod script;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Result},
    port::{Port, SerialConfig},
    protocol::{Ack, ChunkedTransfer, Frame, FrameReceiver, TransferConfig},
    repl::{PasteConfig, SyncConfig, SyncOutcome},
    script::{ReceiverScript, ReceiverVariant},
    session::{Session, SessionConfig},
};
