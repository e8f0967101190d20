//! Raw paste mode of the MicroPython REPL.
//!
//! Ctrl-E switches the prompt into paste mode, where every following line is
//! buffered verbatim; Ctrl-D compiles and runs the buffer. The board processes
//! pasted input slower than the line can deliver it, so every write is
//! followed by a pause that grows with its size.

use crate::error::{Error, Result};
use crate::port::timed::drain_input;
use crate::script::python_string;
use log::trace;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

/// Ctrl-E, enter paste mode.
pub const START_PASTE: u8 = 0x05;

/// Ctrl-D, leave paste mode and execute.
pub const END_PASTE: u8 = 0x04;

/// Line ending used for pasted source.
pub const CR: &str = "\r";

/// Line ending used by [`PasteSender::run_file`].
pub const CRLF: &str = "\r\n";

/// Default pause after a write.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(30);

/// Default upper bound on the pause after a write.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Paste pacing configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PasteConfig {
    /// Pause per started 64 bytes written, and the minimum pause.
    pub base_delay: Duration,
    /// Pause never exceeds this.
    pub max_delay: Duration,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl PasteConfig {
    /// Pause after writing `len` bytes of text.
    pub fn send_delay(&self, len: usize) -> Duration {
        let scaled = u32::try_from(len >> 6)
            .ok()
            .and_then(|units| {
                self.base_delay
                    .checked_mul(units)
            })
            .unwrap_or(self.max_delay);
        scaled
            .max(self.base_delay)
            .min(self.max_delay)
    }
}

/// Control byte for a letter: `'c'` is Ctrl-C (0x03).
#[allow(clippy::cast_possible_truncation)]
pub fn control_code(letter: char) -> Result<u8> {
    let lower = letter.to_ascii_lowercase();
    if !lower.is_ascii_lowercase() {
        return Err(Error::InvalidControlCharacter(letter));
    }
    Ok(lower as u8 - b'a' + 1)
}

/// Writes lines and control bytes to the REPL.
pub struct PasteSender<'a, P: Read + Write + ?Sized> {
    port: &'a mut P,
    config: PasteConfig,
}

impl<'a, P: Read + Write + ?Sized> PasteSender<'a, P> {
    /// Create a sender with default pacing.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: PasteConfig::default(),
        }
    }

    /// Create a sender with custom pacing.
    pub fn with_config(port: &'a mut P, config: PasteConfig) -> Self {
        Self { port, config }
    }

    /// Write one control byte.
    pub fn send_control(&mut self, byte: u8) -> Result<()> {
        trace!("Sending control byte 0x{byte:02X}");
        self.port.write_all(&[byte])?;
        self.port.flush()?;
        thread::sleep(self.config.send_delay(1));
        Ok(())
    }

    /// Enter paste mode.
    pub fn start_paste(&mut self) -> Result<()> {
        self.send_control(START_PASTE)
    }

    /// Leave paste mode, running what was pasted.
    pub fn end_paste(&mut self) -> Result<()> {
        self.send_control(END_PASTE)
    }

    /// Write `text` followed by `ending`, then pause.
    pub fn send_line(&mut self, text: &str, ending: &str) -> Result<()> {
        trace!("Sending line: {text}");
        let mut line = Vec::with_capacity(text.len() + ending.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(ending.as_bytes());

        self.port.write_all(&line)?;
        self.port.flush()?;
        thread::sleep(self.config.send_delay(text.len()));
        Ok(())
    }

    /// Paste `lines` and execute them, then discard the echo.
    pub fn paste_lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.start_paste()?;
        for line in lines {
            self.send_line(line.as_ref(), CR)?;
        }
        self.end_paste()?;
        drain_input(&mut *self.port)?;
        Ok(())
    }

    /// Execute a file stored on the board in the global namespace.
    ///
    /// `globals_init` is pasted as one line before the file runs, e.g. to set
    /// variables the file reads.
    pub fn run_file(&mut self, file_name: &str, globals_init: Option<&str>) -> Result<()> {
        self.start_paste()?;
        if let Some(init) = globals_init.filter(|init| !init.is_empty()) {
            self.send_line(init, CR)?;
        }
        self.send_line(
            &format!("with open({}) as f:", python_string(file_name)),
            CRLF,
        )?;
        self.send_line("    exec(f.read(), globals())", CRLF)?;
        self.end_paste()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records writes; never has anything to read.
    #[derive(Default)]
    struct Recorder {
        written: Vec<u8>,
        reads: usize,
    }

    impl Read for Recorder {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            Ok(0)
        }
    }

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn no_delay() -> PasteConfig {
        PasteConfig {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_send_delay_scales_with_size() {
        let config = PasteConfig::default();
        let ms = Duration::from_millis;
        assert_eq!(config.send_delay(0), ms(30));
        assert_eq!(config.send_delay(63), ms(30));
        assert_eq!(config.send_delay(64), ms(30));
        assert_eq!(config.send_delay(128), ms(60));
        assert_eq!(config.send_delay(64 * 20), ms(600));
        assert_eq!(config.send_delay(64 * 40), ms(1000));
        assert_eq!(config.send_delay(usize::MAX), ms(1000));
    }

    #[test]
    fn test_control_code() {
        assert_eq!(control_code('a').unwrap(), 0x01);
        assert_eq!(control_code('c').unwrap(), 0x03);
        assert_eq!(control_code('D').unwrap(), 0x04);
        assert_eq!(control_code('e').unwrap(), START_PASTE);
        assert_eq!(control_code('z').unwrap(), 0x1A);
        assert!(matches!(
            control_code('1'),
            Err(Error::InvalidControlCharacter('1'))
        ));
        assert!(control_code('é').is_err());
    }

    #[test]
    fn test_run_file_with_init() {
        let mut port = Recorder::default();
        PasteSender::with_config(&mut port, no_delay())
            .run_file("__upload.py", Some("file_name=\"main.py\""))
            .unwrap();

        let expected = "\x05file_name=\"main.py\"\r\
                        with open(\"__upload.py\") as f:\r\n    \
                        exec(f.read(), globals())\r\n\x04";
        assert_eq!(String::from_utf8(port.written).unwrap(), expected);
    }

    #[test]
    fn test_run_file_without_init() {
        let mut port = Recorder::default();
        PasteSender::with_config(&mut port, no_delay())
            .run_file("boot.py", None)
            .unwrap();
        let text = String::from_utf8(port.written).unwrap();
        assert!(text.starts_with("\x05with open(\"boot.py\") as f:"));
    }

    #[test]
    fn test_paste_lines_drains_afterwards() {
        let mut port = Recorder::default();
        PasteSender::with_config(&mut port, no_delay())
            .paste_lines(["import os", "os.remove(\"x.py\")"])
            .unwrap();
        assert_eq!(port.written, b"\x05import os\ros.remove(\"x.py\")\r\x04");
        assert_eq!(port.reads, 1);
    }
}
