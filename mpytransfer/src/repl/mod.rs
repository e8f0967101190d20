//! Interaction with the MicroPython REPL.

pub mod paste;
pub mod prompt;

pub use paste::{PasteConfig, PasteSender, control_code};
pub use prompt::{SyncConfig, SyncOutcome, synchronize};
