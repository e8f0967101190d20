//! Device-side receiver program.
//!
//! The receiver (`receiver.py`) is written once, with a quoted placeholder
//! where the target file name goes, and rendered in two variants:
//!
//! - [`ReceiverVariant::Bootstrap`]: the placeholder becomes a fixed file
//!   name. Pasted into the REPL, it starts receiving immediately and is used to
//!   persist the second variant on the board.
//! - [`ReceiverVariant::Parameterized`]: the placeholder becomes a bare global
//!   variable. This is the copy kept on the board; each transfer only sets the
//!   variable and runs the file.

use crate::error::{Error, Result};
use std::borrow::Cow;

/// Receiver source shipped with the crate.
pub const RECEIVER_SOURCE: &str = include_str!("receiver.py");

/// Quoted target name in the receiver source.
pub const TARGET_PLACEHOLDER: &str = "\"file_name.py\"";

/// Global read by the parameterized receiver.
pub const TARGET_VARIABLE: &str = "file_name";

/// One rendering of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverVariant<'a> {
    /// Writes to a fixed file name.
    Bootstrap {
        /// File the receiver writes.
        target: &'a str,
    },
    /// Writes to the file named by a global variable.
    Parameterized {
        /// Variable holding the file name.
        variable: &'a str,
    },
}

/// Receiver program template.
#[derive(Debug, Clone)]
pub struct ReceiverScript {
    source: Cow<'static, str>,
}

impl Default for ReceiverScript {
    fn default() -> Self {
        Self {
            source: Cow::Borrowed(RECEIVER_SOURCE),
        }
    }
}

impl ReceiverScript {
    /// Use a custom receiver source.
    ///
    /// The source must contain [`TARGET_PLACEHOLDER`].
    pub fn from_source(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if !source.contains(TARGET_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "receiver source has no {TARGET_PLACEHOLDER} placeholder"
            )));
        }
        Ok(Self {
            source: Cow::Owned(source),
        })
    }

    /// Template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render one variant.
    pub fn render(&self, variant: ReceiverVariant<'_>) -> String {
        match variant {
            ReceiverVariant::Bootstrap { target } => self
                .source
                .replace(TARGET_PLACEHOLDER, &python_string(target)),
            ReceiverVariant::Parameterized { variable } => self
                .source
                .replace(TARGET_PLACEHOLDER, variable),
        }
    }

    /// Receiver writing to `target`, ready to be pasted.
    pub fn bootstrap(&self, target: &str) -> String {
        self.render(ReceiverVariant::Bootstrap { target })
    }

    /// Receiver reading its target from [`TARGET_VARIABLE`].
    pub fn parameterized(&self) -> String {
        self.render(ReceiverVariant::Parameterized {
            variable: TARGET_VARIABLE,
        })
    }
}

/// Line that points the parameterized receiver at `file_name`.
pub fn target_init(file_name: &str) -> String {
    format!("{TARGET_VARIABLE}={}", python_string(file_name))
}

/// Quote `value` as a Python string literal.
pub fn python_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
